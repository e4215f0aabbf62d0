//! Shared application state.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::infrastructure::fileprod::ProducerChain;
use crate::infrastructure::registry::RoomGroup;
use crate::infrastructure::token::TokenSigner;

use super::hooks::HookRegistry;
use super::http_log::AccessLogWriter;

/// Process singletons, initialized during startup and never reinitialized.
pub struct AppState {
    pub config: ServerConfig,
    /// Live room registry and id allocator
    pub group: Arc<RoomGroup>,
    /// File producer pipeline for the static surface
    pub producers: Arc<ProducerChain>,
    /// Ordered request hooks consulted by the fallback
    pub hooks: Arc<HookRegistry>,
    /// Identity cookie signer
    pub signer: Arc<TokenSigner>,
    /// HTTP access log sink
    pub http_log: AccessLogWriter,
}
