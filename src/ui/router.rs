//! Router assembly.
//!
//! WebSocket endpoints are routes; everything else funnels into the
//! fallback, which walks the ordered hook registry (static files, redirects,
//! built-in 404).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, header::SET_COOKIE},
    middleware,
    response::Response,
    routing::get,
};

use super::cookies::ensure_identity;
use super::handler;
use super::hooks::RequestContext;
use super::http_log;
use super::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(handler::http::health_check))
        .route("/api/rooms", get(handler::http::get_rooms))
        .route("/api/rooms/{room}", get(handler::http::get_room_detail))
        .route("/api/ws", get(handler::websocket::api_ws_handler))
        .route("/room/{room}/ws", get(handler::websocket::room_ws_handler))
        .fallback(hook_fallback)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            http_log::access_log,
        ))
        .with_state(state)
}

/// Walk the hook chain for anything that is not a routed endpoint, and make
/// sure the response carries a valid identity cookie.
async fn hook_fallback(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let (parts, _body) = request.into_parts();
    let ctx = RequestContext::new(parts.method, &parts.uri, parts.headers, Some(addr));
    let identity = ensure_identity(
        &state.signer,
        state.group.ids(),
        &ctx.headers,
        state.config.cookies_insecure,
    );

    let mut response = state.hooks.dispatch(&ctx).await;
    if let Some(cookie) = identity.set_cookie
        && let Ok(value) = HeaderValue::from_str(&cookie)
    {
        response.headers_mut().append(SET_COOKIE, value);
    }
    response
}
