//! UseCase: client connection.
//!
//! Runs when a WebSocket upgrade completes: allocates the connection id,
//! registers the client with its target room (creating the room on first
//! join), and announces the arrival to the room.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::common::time::now_millis;
use crate::domain::{ConnectionId, Envelope, Member, RoomName, Timestamp};
use crate::infrastructure::registry::{BroadcastOpts, MemberHandle, Outbound, Room, RoomGroup};

use super::disconnect_client::evict_overflowed;

/// Everything known about a connection at upgrade time.
pub struct ConnectParams {
    /// Target room; `None` lands the client in the null room
    pub room: Option<RoomName>,
    pub remote_addr: Option<SocketAddr>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    /// Session id recovered from a verified identity cookie
    pub session_id: Option<String>,
    /// The client's bounded send queue
    pub sender: mpsc::Sender<Outbound>,
    /// Out-of-band close signal for queue-overflow eviction
    pub close: watch::Sender<Option<u16>>,
}

/// A registered connection.
pub struct ConnectedClient {
    pub uid: ConnectionId,
    pub room: Arc<Room>,
}

/// Client connection use case.
pub struct ConnectClientUseCase {
    group: Arc<RoomGroup>,
}

impl ConnectClientUseCase {
    pub fn new(group: Arc<RoomGroup>) -> Self {
        Self { group }
    }

    /// Register the connection and emit the `joined` presence event.
    pub async fn execute(&self, params: ConnectParams) -> ConnectedClient {
        let uid = self.group.next_connection_id();
        let mut member = Member::new(uid, Timestamp::new(now_millis()));
        member.remote_addr = params.remote_addr;
        member.user_agent = params.user_agent;
        member.referer = params.referer;
        member.session_id = params.session_id;
        let nick = member.nick.clone();

        let handle = MemberHandle::new(member, params.sender, params.close);
        let (room, inserted) = self.group.join(params.room.as_ref(), handle).await;

        info!(
            uid = %uid,
            room = room.name().map(|n| n.as_str()).unwrap_or("<null>"),
            remote = ?params.remote_addr,
            "client connected"
        );

        // The joining client receives its own `joined` broadcast; that is
        // how it learns its uid. The null room has no presence.
        if inserted && !room.is_null() {
            let presence = Envelope::of("joined")
                .from_server()
                .with_data(json!({"uid": uid.to_string(), "nick": nick.as_str()}));
            if let Ok(outcome) = room.broadcast(presence, BroadcastOpts::server()).await {
                evict_overflowed(&self.group, &room, outcome.overflowed).await;
            }
        }

        ConnectedClient { uid, room }
    }
}
