//! UseCase: inbound frame dispatch.
//!
//! Decodes each inbound text frame as an envelope and routes it by `type`.
//! Replies (`pong`, `error`, `who`) go to the originator only; `broadcast`
//! fans out through the room; `unicast` targets one member. Client-protocol
//! errors answer the originator and leave the connection up; only an
//! overflow of the client's own queue ends the session.

use std::sync::Arc;

use serde_json::{Number, Value, json};
use tracing::debug;

use crate::domain::{ConnectionId, Envelope, Nick, RoomError};
use crate::infrastructure::registry::{BroadcastOpts, OriginatorEcho, Room, RoomGroup};

use super::disconnect_client::evict_overflowed;
use super::error::SessionError;

/// Per-connection state the dispatcher needs.
pub struct ClientContext {
    pub uid: ConnectionId,
    pub room: Arc<Room>,
}

/// Inbound frame dispatch use case.
pub struct DispatchFrameUseCase {
    group: Arc<RoomGroup>,
}

impl DispatchFrameUseCase {
    pub fn new(group: Arc<RoomGroup>) -> Self {
        Self { group }
    }

    /// Handle one inbound text frame.
    pub async fn execute(&self, ctx: &ClientContext, raw: &str) -> Result<(), SessionError> {
        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                debug!(uid = %ctx.uid, %err, "rejected inbound frame");
                return self.reply_error(ctx, None, "malformed-envelope").await;
            }
        };
        let seq = envelope.seq.clone();

        let kind = envelope.r#type.clone();
        match kind.as_str() {
            "ping" => {
                self.reply(ctx, Envelope::of("pong").from_server().with_seq(seq))
                    .await
            }
            "unicast" => self.handle_unicast(ctx, envelope).await,
            "broadcast" => self.handle_broadcast(ctx, envelope).await,
            "who" => self.handle_who(ctx, seq).await,
            "nick" => self.handle_nick(ctx, envelope).await,
            other => {
                debug!(uid = %ctx.uid, r#type = other, "unknown envelope type");
                self.reply_error(ctx, seq, "unknown-type").await
            }
        }
    }

    async fn handle_unicast(
        &self,
        ctx: &ClientContext,
        envelope: Envelope,
    ) -> Result<(), SessionError> {
        let seq = envelope.seq.clone();
        let Some(target) = envelope
            .to
            .as_deref()
            .and_then(|to| ConnectionId::parse(to).ok())
        else {
            return self.reply_error(ctx, seq, "no-such-member").await;
        };

        let delivery = Envelope::of("unicast")
            .from_client(ctx.uid)
            .with_to(target.to_string())
            .with_data(envelope.data);
        match ctx.room.unicast(target, delivery).await {
            Ok(outcome) => {
                if outcome.overflowed {
                    evict_overflowed(&self.group, &ctx.room, vec![target]).await;
                }
                Ok(())
            }
            Err(RoomError::NoSuchMember(_)) => self.reply_error(ctx, seq, "no-such-member").await,
            Err(RoomError::NoSuchRoom) => self.reply_error(ctx, seq, "no-such-room").await,
        }
    }

    async fn handle_broadcast(
        &self,
        ctx: &ClientContext,
        envelope: Envelope,
    ) -> Result<(), SessionError> {
        let seq = envelope.seq.clone();
        let fanout = Envelope::of("broadcast")
            .from_client(ctx.uid)
            .with_data(envelope.data);
        let opts = BroadcastOpts {
            originator: Some(OriginatorEcho {
                uid: ctx.uid,
                seq,
                exclude: envelope.exclude_self,
            }),
            record: true,
        };
        match ctx.room.broadcast(fanout, opts).await {
            Ok(outcome) => self.settle_overflow(ctx, outcome.overflowed).await,
            Err(RoomError::NoSuchRoom) => {
                self.reply_error(ctx, envelope.seq, "no-such-room").await
            }
            Err(RoomError::NoSuchMember(_)) => Ok(()),
        }
    }

    async fn handle_who(
        &self,
        ctx: &ClientContext,
        seq: Option<Number>,
    ) -> Result<(), SessionError> {
        if ctx.room.is_null() {
            return self.reply_error(ctx, seq, "no-such-room").await;
        }
        let snapshot = ctx.room.snapshot().await;
        self.reply(
            ctx,
            Envelope::of("who")
                .from_server()
                .with_seq(seq)
                .with_data(serde_json::to_value(snapshot).unwrap()),
        )
        .await
    }

    async fn handle_nick(
        &self,
        ctx: &ClientContext,
        envelope: Envelope,
    ) -> Result<(), SessionError> {
        let seq = envelope.seq.clone();
        let requested = envelope
            .data
            .get("nick")
            .and_then(Value::as_str)
            .map(|nick| Nick::new(nick.to_string()));
        let Some(Ok(nick)) = requested else {
            return self.reply_error(ctx, seq, "invalid-nick").await;
        };

        if ctx.room.update_nick(ctx.uid, nick.clone()).await.is_none() {
            // Mid-disconnect; nothing left to announce.
            return Ok(());
        }
        if ctx.room.is_null() {
            return Ok(());
        }
        let presence = Envelope::of("nick").from_server().with_data(json!({
            "uid": ctx.uid.to_string(),
            "nick": nick.as_str(),
        }));
        match ctx.room.broadcast(presence, BroadcastOpts::server()).await {
            Ok(outcome) => self.settle_overflow(ctx, outcome.overflowed).await,
            Err(_) => Ok(()),
        }
    }

    /// Evict overflowed members; an overflow of the caller's own queue ends
    /// the caller's session instead.
    async fn settle_overflow(
        &self,
        ctx: &ClientContext,
        overflowed: Vec<ConnectionId>,
    ) -> Result<(), SessionError> {
        let own_overflow = overflowed.contains(&ctx.uid);
        let others: Vec<ConnectionId> = overflowed
            .into_iter()
            .filter(|uid| *uid != ctx.uid)
            .collect();
        evict_overflowed(&self.group, &ctx.room, others).await;
        if own_overflow {
            return Err(SessionError::QueueOverflow);
        }
        Ok(())
    }

    async fn reply(&self, ctx: &ClientContext, envelope: Envelope) -> Result<(), SessionError> {
        match ctx.room.unicast(ctx.uid, envelope).await {
            Ok(outcome) if outcome.overflowed => Err(SessionError::QueueOverflow),
            // A missing member means this client is mid-disconnect; the
            // reply has nowhere to go.
            _ => Ok(()),
        }
    }

    async fn reply_error(
        &self,
        ctx: &ClientContext,
        seq: Option<Number>,
        reason: &str,
    ) -> Result<(), SessionError> {
        self.reply(
            ctx,
            Envelope::of("error")
                .from_server()
                .with_seq(seq)
                .with_data(json!({"reason": reason})),
        )
        .await
    }
}
