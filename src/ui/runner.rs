//! Server startup: wire the process singletons, bind, serve, shut down.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::ServerConfig;
use crate::domain::ROOM_NAME_PATTERN;
use crate::infrastructure::fileprod::synthetic::escape_js;
use crate::infrastructure::fileprod::{
    FileSystemProducer, ProducerChain, ResourceProducer, SyntheticProducer,
};
use crate::infrastructure::registry::{CLOSE_GOING_AWAY, RoomGroup};
use crate::infrastructure::token::{KeyError, TokenSigner};

use super::hooks::{HookRegistry, RedirectHook, RequestHook, StaticFileHook};
use super::http_log::AccessLogWriter;
use super::router::build_router;
use super::signal::shutdown_signal;
use super::state::AppState;

/// Grace period between the shutdown close broadcast and severing sockets.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Fatal startup and serve errors.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("invalid built-in pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A bound, ready-to-serve server instance.
///
/// Tests bind to an ephemeral port and read it back via
/// [`Server::local_addr`]; production goes through [`run`].
pub struct Server {
    listener: TcpListener,
    state: Arc<AppState>,
    router: Router,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, RunError> {
        let state = build_state(config)?;
        let addr = state.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| RunError::Bind { addr, source })?;
        let router = build_router(Arc::clone(&state));
        Ok(Self {
            listener,
            state,
            router,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Get a reference to the shared state (for testing).
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Serve until the process shutdown signal arrives.
    pub async fn serve(self) -> Result<(), RunError> {
        self.serve_with_shutdown(shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves: then every client receives a close
    /// (1001), and sockets still open after the grace period are severed.
    pub async fn serve_with_shutdown(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), RunError> {
        let group = Arc::clone(&self.state.group);
        let (closing_tx, closing_rx) = tokio::sync::oneshot::channel::<()>();

        let server = axum::serve(
            self.listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("shutting down: closing client connections");
            group.close_all(CLOSE_GOING_AWAY).await;
            let _ = closing_tx.send(());
        });

        tokio::select! {
            result = server => result.map_err(RunError::Io),
            _ = async {
                let _ = closing_rx.await;
                tokio::time::sleep(SHUTDOWN_GRACE).await;
            } => {
                info!("severing remaining connections");
                Ok(())
            }
        }
    }
}

/// Bind and serve with the process signal handler. Entry point of the
/// binary's main loop.
pub async fn run(config: ServerConfig) -> Result<(), RunError> {
    let server = Server::bind(config).await?;
    info!(addr = %server.local_addr()?, "listening");
    server.serve().await
}

fn build_state(config: ServerConfig) -> Result<Arc<AppState>, RunError> {
    let signer = TokenSigner::load(config.cookie_keyfile.as_deref())?;
    let producers = build_producer_chain(&config)?;
    let hooks = build_hooks(Arc::clone(&producers))?;
    let http_log = AccessLogWriter::open(&config.http_log);
    Ok(Arc::new(AppState {
        group: Arc::new(RoomGroup::new()),
        producers,
        hooks,
        signer: Arc::new(signer),
        http_log,
        config,
    }))
}

/// The default hook order: static files (with aliases), then redirects.
/// The registry's built-in 404 answers last.
fn build_hooks(producers: Arc<ProducerChain>) -> Result<Arc<HookRegistry>, RunError> {
    let mut redirects = RedirectHook::new();
    redirects.add(&format!("/room/{ROOM_NAME_PATTERN}"), r"\0/", 301)?;

    let hooks: Vec<Arc<dyn RequestHook>> = vec![
        Arc::new(StaticFileHook::new(producers)),
        Arc::new(redirects),
    ];
    Ok(Arc::new(HookRegistry::new(hooks)))
}

/// Assemble the producer chain with the built-in bindings: aliases,
/// content types, the version file, and the whitelisted webroot.
fn build_producer_chain(config: &ServerConfig) -> Result<Arc<ProducerChain>, RunError> {
    let mut chain = ProducerChain::new(config.cache_max_age);

    let aliases = chain.aliases_mut();
    aliases.add_literal("/", "/pages/main.html");
    aliases.add_literal("/favicon.ico", "/static/logo-static_128x128.ico");
    aliases.add_regex(r"/([^/]+)\.html", r"/pages/\1.html")?;
    aliases.add_regex(&format!("/room/{ROOM_NAME_PATTERN}/"), "/static/room.html")?;

    let content_types = chain.content_types_mut();
    content_types.add(r".*\.html", "text/html; charset=utf-8")?;
    content_types.add(r".*\.css", "text/css; charset=utf-8")?;
    content_types.add(r".*\.js", "application/javascript; charset=utf-8")?;
    content_types.add(r".*\.svg", "image/svg+xml; charset=utf-8")?;
    content_types.add(r".*\.png", "image/png")?;
    content_types.add(r".*\.ico", "image/vnd.microsoft.icon")?;

    let mut synthetic = SyntheticProducer::new();
    synthetic.register("/static/version.js", version_file(config));

    let mut filesystem = FileSystemProducer::new(config.webroot.clone());
    filesystem.whitelist("/pages/.*")?;
    filesystem.whitelist("/static/.*")?;

    chain.push_producer(Arc::new(synthetic));
    chain.push_producer(Arc::new(filesystem));
    chain.push_producer(Arc::new(ResourceProducer::new()));
    Ok(Arc::new(chain))
}

fn version_file(config: &ServerConfig) -> String {
    let version = escape_js(env!("CARGO_PKG_VERSION"));
    let revision = match &config.revision {
        Some(revision) => format!("\"{}\"", escape_js(revision)),
        None => "null".to_string(),
    };
    format!("this._instantVersion_ = {{version: \"{version}\", revision: {revision}}};\n")
}
