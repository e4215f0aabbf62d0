//! Ordered request hooks for everything that is not a WebSocket upgrade.
//!
//! The registry is assembled once at startup and then only iterated: each
//! hook may claim a request by returning a response, or decline by returning
//! `None`. The built-in 404 answers when every hook declines.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, LOCATION, REFERER, USER_AGENT};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use regex::Regex;
use tracing::warn;

use crate::common::time::now_millis;
use crate::infrastructure::fileprod::alias::expand_template;
use crate::infrastructure::fileprod::{ProduceError, ProducerChain};

use super::cookies::parse_cookies;

/// Read-only view of an inbound request handed to each hook.
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    /// Query parameters, decoded, in wire order
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub cookies: Vec<(String, String)>,
    pub remote_addr: Option<SocketAddr>,
    /// Arrival time, epoch milliseconds
    pub timestamp: i64,
}

impl RequestContext {
    pub fn new(
        method: Method,
        uri: &Uri,
        headers: HeaderMap,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        let query = uri
            .query()
            .map(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();
        let cookies = parse_cookies(&headers);
        Self {
            method,
            path: uri.path().to_string(),
            query,
            headers,
            cookies,
            remote_addr,
            timestamp: now_millis(),
        }
    }

    pub fn header(&self, name: &axum::http::HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header(&USER_AGENT)
    }

    pub fn referer(&self) -> Option<&str> {
        self.header(&REFERER)
    }
}

/// A pluggable handler consulted in order for each request.
#[async_trait]
pub trait RequestHook: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Some(response)` claims the request; `None` passes it on.
    async fn evaluate(&self, ctx: &RequestContext) -> Option<Response>;
}

/// Startup-frozen, ordered list of hooks.
pub struct HookRegistry {
    hooks: Vec<Arc<dyn RequestHook>>,
}

impl HookRegistry {
    pub fn new(hooks: Vec<Arc<dyn RequestHook>>) -> Self {
        Self { hooks }
    }

    /// Walk the hooks in registration order; first claim wins, the built-in
    /// 404 answers otherwise.
    pub async fn dispatch(&self, ctx: &RequestContext) -> Response {
        for hook in &self.hooks {
            if let Some(response) = hook.evaluate(ctx).await {
                return response;
            }
        }
        not_found()
    }
}

/// The built-in minimal 404.
pub fn not_found() -> Response {
    text_response(StatusCode::NOT_FOUND, "404 Not Found\n")
}

fn text_response(status: StatusCode, body: &'static str) -> Response {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(body))
        .unwrap()
}

/// Serves blobs out of the producer chain.
pub struct StaticFileHook {
    producers: Arc<ProducerChain>,
}

impl StaticFileHook {
    pub fn new(producers: Arc<ProducerChain>) -> Self {
        Self { producers }
    }
}

#[async_trait]
impl RequestHook for StaticFileHook {
    fn name(&self) -> &'static str {
        "static-file"
    }

    async fn evaluate(&self, ctx: &RequestContext) -> Option<Response> {
        if ctx.method != Method::GET && ctx.method != Method::HEAD {
            return None;
        }
        match self.producers.get(&ctx.path).await {
            Ok(Some(blob)) => {
                // The body is attached for HEAD too; the HTTP layer strips
                // it while keeping the declared length.
                Some(
                    Response::builder()
                        .status(StatusCode::OK)
                        .header(CONTENT_TYPE, blob.content_type.as_str())
                        .header(axum::http::header::CONTENT_LENGTH, blob.bytes.len())
                        .body(Body::from(blob.bytes.clone()))
                        .unwrap(),
                )
            }
            Ok(None) => None,
            Err(err) => {
                // An I/O failure on one path must not leak past this request.
                warn!(path = ctx.path, %err, "producer error");
                let status = match err {
                    ProduceError::AliasCycle(_) | ProduceError::Io { .. } => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                Some(text_response(status, "500 Internal Server Error\n"))
            }
        }
    }
}

struct RedirectRule {
    regex: Regex,
    template: String,
    status: StatusCode,
}

/// Pattern-based redirects, e.g. `/room/<name>` → `/room/<name>/`.
#[derive(Default)]
pub struct RedirectHook {
    rules: Vec<RedirectRule>,
}

impl RedirectHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Redirect whole paths matching `pattern` to the expansion of
    /// `template` (same backreference syntax as aliases). `code` must be
    /// 301 or 302.
    pub fn add(&mut self, pattern: &str, template: &str, code: u16) -> Result<(), regex::Error> {
        let status = match code {
            301 => StatusCode::MOVED_PERMANENTLY,
            _ => StatusCode::FOUND,
        };
        self.rules.push(RedirectRule {
            regex: Regex::new(&format!("^(?:{pattern})$"))?,
            template: template.to_string(),
            status,
        });
        Ok(())
    }
}

#[async_trait]
impl RequestHook for RedirectHook {
    fn name(&self) -> &'static str {
        "redirect"
    }

    async fn evaluate(&self, ctx: &RequestContext) -> Option<Response> {
        for rule in &self.rules {
            if let Some(caps) = rule.regex.captures(&ctx.path) {
                let location = expand_template(&caps, &rule.template);
                return Some(
                    Response::builder()
                        .status(rule.status)
                        .header(LOCATION, location)
                        .body(Body::empty())
                        .unwrap(),
                );
            }
        }
        None
    }
}
