//! HTTP access logging in Apache combined log format.

use std::fs::File;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{CONTENT_LENGTH, REFERER, USER_AGENT};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use tracing::warn;

use crate::config::LogTarget;

use super::state::AppState;

/// Where access-log lines go. Opened once at startup.
#[derive(Clone)]
pub enum AccessLogWriter {
    Stderr,
    File(Arc<Mutex<File>>),
}

impl AccessLogWriter {
    /// Open the configured target, falling back to stderr when a log file
    /// cannot be opened.
    pub fn open(target: &LogTarget) -> Self {
        match target {
            LogTarget::Stderr => Self::Stderr,
            LogTarget::File(path) => match File::options().append(true).create(true).open(path) {
                Ok(file) => Self::File(Arc::new(Mutex::new(file))),
                Err(err) => {
                    warn!(path = %path.display(), %err, "cannot open http log, using stderr");
                    Self::Stderr
                }
            },
        }
    }

    fn write_line(&self, line: &str) {
        match self {
            Self::Stderr => eprintln!("{line}"),
            Self::File(file) => {
                if let Ok(mut file) = file.lock() {
                    let _ = writeln!(file, "{line}");
                }
            }
        }
    }
}

/// Middleware logging one combined-format line per request.
pub async fn access_log(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let version = format!("{:?}", request.version());
    let referer = header_or_dash(request.headers().get(REFERER));
    let user_agent = header_or_dash(request.headers().get(USER_AGENT));
    let time = Utc::now().format("%d/%b/%Y:%H:%M:%S %z");

    let response = next.run(request).await;

    let length = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let line = format!(
        "{ip} - - [{time}] \"{method} {target} {version}\" {status} {length} \"{referer}\" \"{user_agent}\"",
        ip = addr.ip(),
        status = response.status().as_u16(),
    );
    state.http_log.write_line(&line);
    response
}

fn header_or_dash(value: Option<&axum::http::HeaderValue>) -> String {
    value
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-")
        .to_string()
}
