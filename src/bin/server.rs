//! Multi-room chat server binary.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin instant-server -- 8080 -r ./webroot
//! ```
//!
//! Exit codes: 0 clean shutdown, 1 bad arguments or runtime failure,
//! 2 startup-command failure.

use clap::Parser;
use clap::error::ErrorKind;

use instant_server::{Cli, ServerConfig, setup_logger};

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            std::process::exit(0);
        }
        Err(err) => {
            let _ = err.print();
            std::process::exit(1);
        }
    };

    let config = ServerConfig::from_cli(cli);
    setup_logger(&config);

    if let Some(cmd) = &config.startup_cmd
        && !run_startup_command(cmd)
    {
        std::process::exit(2);
    }

    if let Err(err) = instant_server::run_server(config).await {
        tracing::error!("server error: {err}");
        std::process::exit(1);
    }
}

/// Run the configured shell command to completion before the main loop.
fn run_startup_command(cmd: &str) -> bool {
    tracing::info!(%cmd, "running startup command");
    match std::process::Command::new("sh").arg("-c").arg(cmd).status() {
        Ok(status) if status.success() => true,
        Ok(status) => {
            tracing::error!(%cmd, ?status, "startup command failed");
            false
        }
        Err(err) => {
            tracing::error!(%cmd, %err, "cannot run startup command");
            false
        }
    }
}
