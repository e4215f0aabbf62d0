//! Logging setup.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::config::{LogTarget, ServerConfig};

/// Initialize tracing from the configured level and debug-log target.
/// Call once, before serving.
pub fn setup_logger(config: &ServerConfig) {
    let filter = EnvFilter::try_new(config.log_level.to_ascii_lowercase())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let writer = match &config.debug_log {
        LogTarget::Stderr => BoxMakeWriter::new(std::io::stderr),
        LogTarget::File(path) => {
            match std::fs::OpenOptions::new().append(true).create(true).open(path) {
                Ok(file) => BoxMakeWriter::new(Arc::new(file)),
                Err(err) => {
                    eprintln!("cannot open debug log {}: {err}", path.display());
                    BoxMakeWriter::new(std::io::stderr)
                }
            }
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false)
        .init();
}
