//! UseCase: client disconnection.
//!
//! Runs after a session's read and write tasks have stopped, and as the
//! eviction path for members whose send queue overflowed. Removing the
//! member comes first; only then is the `left` presence broadcast, so the
//! departing client can never observe its own departure.

use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::domain::{ConnectionId, Envelope, Member};
use crate::infrastructure::registry::{
    BroadcastOpts, CLOSE_INTERNAL_OVERLOAD, Room, RoomGroup,
};

fn left_presence(member: &Member) -> Envelope {
    Envelope::of("left").from_server().with_data(json!({
        "uid": member.uid.to_string(),
        "nick": member.nick.as_str(),
    }))
}

/// Remove members whose queue overflowed: sever each with 1011, then emit
/// its `left` presence. A presence broadcast can overflow further queues,
/// so this drains a worklist instead of recursing.
pub(crate) async fn evict_overflowed(
    group: &RoomGroup,
    room: &Arc<Room>,
    mut pending: Vec<ConnectionId>,
) {
    while let Some(uid) = pending.pop() {
        let Some(handle) = group.leave(room, uid).await else {
            continue;
        };
        handle.force_close(CLOSE_INTERNAL_OVERLOAD);
        info!(uid = %uid, "client evicted: send queue overflow");
        if !room.is_null()
            && let Ok(outcome) = room
                .broadcast(left_presence(&handle.member), BroadcastOpts::server())
                .await
        {
            pending.extend(outcome.overflowed);
        }
    }
}

/// Client disconnection use case.
pub struct DisconnectClientUseCase {
    group: Arc<RoomGroup>,
}

impl DisconnectClientUseCase {
    pub fn new(group: Arc<RoomGroup>) -> Self {
        Self { group }
    }

    /// Remove the client from its room and announce the departure.
    /// Idempotent: a client that was already evicted is a no-op.
    pub async fn execute(&self, room: &Arc<Room>, uid: ConnectionId) {
        let Some(handle) = self.group.leave(room, uid).await else {
            return;
        };
        info!(
            uid = %uid,
            room = room.name().map(|n| n.as_str()).unwrap_or("<null>"),
            "client disconnected"
        );
        if !room.is_null()
            && let Ok(outcome) = room
                .broadcast(left_presence(&handle.member), BroadcastOpts::server())
                .await
        {
            evict_overflowed(&self.group, room, outcome.overflowed).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::{mpsc, watch};

    use crate::domain::{Member, RoomName, Timestamp};
    use crate::infrastructure::registry::{MemberHandle, Outbound};

    use super::*;

    fn member_handle(uid: u64, capacity: usize) -> (MemberHandle, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        let (close_tx, _close_rx) = watch::channel(None);
        let member = Member::new(ConnectionId::new(uid), Timestamp::new(0));
        (MemberHandle::new(member, tx, close_tx), rx)
    }

    async fn recv_json(rx: &mut mpsc::Receiver<Outbound>) -> serde_json::Value {
        match rx.recv().await.unwrap() {
            Outbound::Frame(bytes) => serde_json::from_str(bytes.as_str()).unwrap(),
            Outbound::Close(code) => panic!("expected frame, got close {code}"),
        }
    }

    #[tokio::test]
    async fn test_disconnect_emits_left_to_remaining_members() {
        // given: alice and bob share a room
        let group = Arc::new(RoomGroup::new());
        let name = RoomName::new("x".to_string()).unwrap();
        let (alice, _alice_rx) = member_handle(1, 8);
        let (bob, mut bob_rx) = member_handle(2, 8);
        let (room, _) = group.join(Some(&name), alice).await;
        group.join(Some(&name), bob).await;

        // when: alice disconnects
        DisconnectClientUseCase::new(group.clone())
            .execute(&room, ConnectionId::new(1))
            .await;

        // then:
        let left = recv_json(&mut bob_rx).await;
        assert_eq!(left["type"], "left");
        assert_eq!(left["from"], "server");
        assert_eq!(left["data"]["uid"], "1");
    }

    #[tokio::test]
    async fn test_last_disconnect_destroys_the_room() {
        // given:
        let group = Arc::new(RoomGroup::new());
        let name = RoomName::new("x".to_string()).unwrap();
        let (alice, _rx) = member_handle(1, 8);
        let (room, _) = group.join(Some(&name), alice).await;

        // when:
        DisconnectClientUseCase::new(group.clone())
            .execute(&room, ConnectionId::new(1))
            .await;

        // then:
        assert!(group.lookup(&name).await.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        // given:
        let group = Arc::new(RoomGroup::new());
        let name = RoomName::new("x".to_string()).unwrap();
        let (alice, _rx) = member_handle(1, 8);
        let (room, _) = group.join(Some(&name), alice).await;
        let usecase = DisconnectClientUseCase::new(group.clone());

        // when: the leave path runs twice
        usecase.execute(&room, ConnectionId::new(1)).await;
        usecase.execute(&room, ConnectionId::new(1)).await;

        // then: no panic, and the room is gone
        assert!(group.lookup(&name).await.is_none());
    }

    #[tokio::test]
    async fn test_eviction_severs_and_announces() {
        // given: bob's queue is full
        let group = Arc::new(RoomGroup::new());
        let name = RoomName::new("x".to_string()).unwrap();
        let (alice, mut alice_rx) = member_handle(1, 8);
        let (bob, _bob_rx) = member_handle(2, 1);
        let (room, _) = group.join(Some(&name), alice).await;
        group.join(Some(&name), bob).await;
        // fill bob's single-slot queue
        room.broadcast(
            Envelope::of("broadcast").from_server(),
            BroadcastOpts::server(),
        )
        .await
        .unwrap();
        recv_json(&mut alice_rx).await;

        // when: the overflow is detected and bob evicted
        let outcome = room
            .broadcast(
                Envelope::of("broadcast").from_server(),
                BroadcastOpts::server(),
            )
            .await
            .unwrap();
        recv_json(&mut alice_rx).await;
        evict_overflowed(&group, &room, outcome.overflowed).await;

        // then: bob is out and alice hears about it
        assert_eq!(room.member_count().await, 1);
        let left = recv_json(&mut alice_rx).await;
        assert_eq!(left["type"], "left");
        assert_eq!(left["data"]["uid"], "2");
    }
}
