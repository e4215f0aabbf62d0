//! Server configuration: command line plus environment variables.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::infrastructure::registry::DEFAULT_SEND_QUEUE_CAPACITY;

/// Environment variable naming a 64-byte signing keyfile.
pub const ENV_COOKIES_KEYFILE: &str = "INSTANT_COOKIES_KEYFILE";
/// Environment variable disabling the `Secure` cookie attribute (`yes`).
pub const ENV_COOKIES_INSECURE: &str = "INSTANT_COOKIES_INSECURE";
/// Environment variable overriding the producer cache TTL, in seconds.
pub const ENV_HTTP_MAXCACHEAGE: &str = "INSTANT_HTTP_MAXCACHEAGE";
/// Environment variable naming the source revision baked into version.js.
pub const ENV_REVISION: &str = "INSTANT_REVISION";

const DEFAULT_CACHE_MAX_AGE_SECS: u64 = 3600;

/// Command-line surface. `-h` selects the bind host, as it always has;
/// help stays on `--help`.
#[derive(Debug, Clone, Parser)]
#[command(name = "instant-server", version, about = "Multi-room chat server", disable_help_flag = true)]
pub struct Cli {
    /// Port to bind to
    #[arg(default_value_t = 8080)]
    pub port: u16,

    /// Host to bind to (`*` = all interfaces)
    #[arg(short = 'h', long, default_value = "*")]
    pub host: String,

    /// Path containing the static directories
    #[arg(short = 'r', long, default_value = ".")]
    pub webroot: PathBuf,

    /// Log file for HTTP requests (`-` = stderr)
    #[arg(long, default_value = "-")]
    pub http_log: String,

    /// Log file for debugging (`-` = stderr)
    #[arg(long, default_value = "-")]
    pub debug_log: String,

    /// Logging level
    #[arg(short = 'L', long, default_value = "INFO")]
    pub log_level: String,

    /// OS command to run before entering the main loop
    #[arg(short = 'c', long)]
    pub startup_cmd: Option<String>,

    /// Print help
    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,
}

/// Destination of a log stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File(PathBuf),
}

impl LogTarget {
    fn parse(value: &str) -> Self {
        if value == "-" {
            Self::Stderr
        } else {
            Self::File(PathBuf::from(value))
        }
    }
}

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub webroot: PathBuf,
    pub http_log: LogTarget,
    pub debug_log: LogTarget,
    pub log_level: String,
    pub startup_cmd: Option<String>,

    /// Explicit signing keyfile; a random key is generated when unset
    pub cookie_keyfile: Option<PathBuf>,
    /// Drop the `Secure` cookie attribute (plain-HTTP deployments)
    pub cookies_insecure: bool,
    /// Producer cache TTL
    pub cache_max_age: Duration,
    /// Bound of each client's send queue
    pub send_queue_capacity: usize,
    /// Source revision reported by `/static/version.js`
    pub revision: Option<String>,
}

impl ServerConfig {
    /// Resolve the CLI against the process environment.
    pub fn from_cli(cli: Cli) -> Self {
        let cache_max_age = std::env::var(ENV_HTTP_MAXCACHEAGE)
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_CACHE_MAX_AGE_SECS));
        Self {
            port: cli.port,
            host: cli.host,
            webroot: cli.webroot,
            http_log: LogTarget::parse(&cli.http_log),
            debug_log: LogTarget::parse(&cli.debug_log),
            log_level: cli.log_level,
            startup_cmd: cli.startup_cmd,
            cookie_keyfile: std::env::var_os(ENV_COOKIES_KEYFILE).map(PathBuf::from),
            cookies_insecure: std::env::var(ENV_COOKIES_INSECURE)
                .is_ok_and(|value| value.trim().eq_ignore_ascii_case("yes")),
            cache_max_age,
            send_queue_capacity: DEFAULT_SEND_QUEUE_CAPACITY,
            revision: std::env::var(ENV_REVISION).ok().filter(|v| !v.is_empty()),
        }
    }

    /// Bind address; `*` means all interfaces.
    pub fn bind_addr(&self) -> String {
        let host = if self.host == "*" { "0.0.0.0" } else { &self.host };
        format!("{host}:{port}", port = self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "*".to_string(),
            webroot: PathBuf::from("."),
            http_log: LogTarget::Stderr,
            debug_log: LogTarget::Stderr,
            log_level: "INFO".to_string(),
            startup_cmd: None,
            cookie_keyfile: None,
            cookies_insecure: false,
            cache_max_age: Duration::from_secs(DEFAULT_CACHE_MAX_AGE_SECS),
            send_queue_capacity: DEFAULT_SEND_QUEUE_CAPACITY,
            revision: None,
        }
    }
}
