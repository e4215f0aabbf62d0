//! WebSocket connection handlers.
//!
//! HTTP and WebSocket split here, at the upgrade boundary: these handlers
//! validate the target, perform the RFC 6455 upgrade, and then run one read
//! task and one writer task per connection until the session ends.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ConnectInfo, Path, State,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use rand::RngCore;
use rand::rngs::OsRng;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::domain::RoomName;
use crate::infrastructure::registry::{CLOSE_INTERNAL_OVERLOAD, Outbound};
use crate::ui::cookies::ensure_identity;
use crate::ui::state::AppState;
use crate::usecase::{
    ClientContext, ConnectClientUseCase, ConnectParams, DisconnectClientUseCase,
    DispatchFrameUseCase,
};

/// Per-connection marker header added to every upgrade response.
const MAGIC_COOKIE_HEADER: HeaderName = HeaderName::from_static("x-magic-cookie");

/// `GET /room/{room}/ws`: upgrade into a named room.
pub async fn room_ws_handler(
    State(state): State<Arc<AppState>>,
    Path(room): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Ok(name) = RoomName::new(room) else {
        return upgrade_rejection();
    };
    upgrade(state, Some(name), addr, headers, ws)
}

/// `GET /api/ws`: upgrade into the null room.
pub async fn api_ws_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(state, None, addr, headers, ws)
}

/// Non-whitelisted upgrade target: no WS session is created.
fn upgrade_rejection() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONNECTION, "close")],
        "404 Not Found\n",
    )
        .into_response()
}

fn upgrade(
    state: Arc<AppState>,
    room: Option<RoomName>,
    addr: SocketAddr,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let identity = ensure_identity(
        &state.signer,
        state.group.ids(),
        &headers,
        state.config.cookies_insecure,
    );
    let user_agent = header_string(&headers, header::USER_AGENT);
    let referer = header_string(&headers, header::REFERER);
    let session_id = identity.session_id;

    let mut response = ws.on_upgrade(move |socket| {
        client_session(socket, state, room, addr, user_agent, referer, session_id)
    });
    let response_headers = response.headers_mut();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/x-websocket"),
    );
    response_headers.insert(MAGIC_COOKIE_HEADER, magic_cookie());
    if let Some(cookie) = identity.set_cookie
        && let Ok(value) = HeaderValue::from_str(&cookie)
    {
        response_headers.append(header::SET_COOKIE, value);
    }
    response
}

fn header_string(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Telemetry marker: a quoted base64 rendering of 12 random bytes.
fn magic_cookie() -> HeaderValue {
    let mut data = [0u8; 12];
    OsRng.fill_bytes(&mut data);
    HeaderValue::from_str(&format!("\"{}\"", STANDARD.encode(data))).unwrap()
}

async fn client_session(
    socket: WebSocket,
    state: Arc<AppState>,
    room: Option<RoomName>,
    addr: SocketAddr,
    user_agent: Option<String>,
    referer: Option<String>,
    session_id: String,
) {
    let (outbound_tx, outbound_rx) = mpsc::channel(state.config.send_queue_capacity);
    let (close_tx, close_rx) = watch::channel(None);

    let client = ConnectClientUseCase::new(Arc::clone(&state.group))
        .execute(ConnectParams {
            room,
            remote_addr: Some(addr),
            user_agent,
            referer,
            session_id: Some(session_id),
            sender: outbound_tx,
            close: close_tx.clone(),
        })
        .await;

    let (sink, stream) = socket.split();
    let mut send_task = tokio::spawn(writer_loop(sink, outbound_rx, close_rx));

    let ctx = ClientContext {
        uid: client.uid,
        room: Arc::clone(&client.room),
    };
    let dispatch = DispatchFrameUseCase::new(Arc::clone(&state.group));
    let mut recv_task = tokio::spawn(read_loop(stream, dispatch, ctx, close_tx));

    // Whichever task finishes first tears the other one down.
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    }

    DisconnectClientUseCase::new(Arc::clone(&state.group))
        .execute(&client.room, client.uid)
        .await;
}

async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    dispatch: DispatchFrameUseCase,
    ctx: ClientContext,
    close: watch::Sender<Option<u16>>,
) {
    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                debug!(uid = %ctx.uid, %err, "websocket read error");
                break;
            }
        };
        match message {
            Message::Text(text) => {
                if let Err(err) = dispatch.execute(&ctx, text.as_str()).await {
                    warn!(uid = %ctx.uid, %err, "closing overloaded session");
                    let _ = close.send(Some(CLOSE_INTERNAL_OVERLOAD));
                    break;
                }
            }
            Message::Close(_) => {
                debug!(uid = %ctx.uid, "client requested close");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                // Handled by the WebSocket protocol layer.
            }
            Message::Binary(_) => {
                debug!(uid = %ctx.uid, "ignoring binary frame");
            }
        }
    }
}

async fn writer_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut queue: mpsc::Receiver<Outbound>,
    mut close_rx: watch::Receiver<Option<u16>>,
) {
    loop {
        tokio::select! {
            changed = close_rx.changed() => {
                // The out-of-band path: the queue may be full, but the
                // socket can still carry the close frame.
                let code = if changed.is_ok() {
                    *close_rx.borrow()
                } else {
                    None
                };
                if let Some(code) = code {
                    let _ = sink.send(close_message(code)).await;
                }
                break;
            }
            item = queue.recv() => match item {
                Some(Outbound::Frame(frame)) => {
                    if sink.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Some(Outbound::Close(code)) => {
                    let _ = sink.send(close_message(code)).await;
                    break;
                }
                None => break,
            }
        }
    }
}

fn close_message(code: u16) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: Utf8Bytes::from_static(""),
    }))
}
