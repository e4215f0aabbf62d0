//! Live room registry and the message fan-out fabric.
//!
//! The [`RoomGroup`] owns the name → room table behind one mutex; each
//! [`Room`] guards its membership behind its own mutex. Lock order is always
//! group before room. Broadcasts never touch a client's socket directly:
//! under the room lock the envelope is stamped, serialized once, and the same
//! byte slice is pushed onto every member's bounded send queue.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use serde_json::Number;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::debug;

use crate::common::id::IdAllocator;
use crate::common::time::now_millis;
use crate::domain::{
    ConnectionId, Envelope, Member, MessageId, Nick, RoomError, RoomName, SnapshotEntry, Timestamp,
};

/// Default bound of a client's send queue.
pub const DEFAULT_SEND_QUEUE_CAPACITY: usize = 256;

/// Broadcast envelopes retained per room, memory-only and best-effort.
const HISTORY_CAPACITY: usize = 64;

/// WebSocket close code sent on shutdown.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// WebSocket close code sent on internal overload (send-queue overflow).
pub const CLOSE_INTERNAL_OVERLOAD: u16 = 1011;

/// Items travelling on a client's send queue, drained by its writer task.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A serialized envelope; clones share the underlying bytes.
    Frame(Utf8Bytes),
    /// Orderly close with the given code, after the queued frames.
    Close(u16),
}

/// A room's handle on one connected client: the member descriptor, the send
/// queue, and an out-of-band close signal for when the queue itself is full.
#[derive(Debug)]
pub struct MemberHandle {
    pub member: Member,
    sender: mpsc::Sender<Outbound>,
    close: watch::Sender<Option<u16>>,
}

impl MemberHandle {
    pub fn new(
        member: Member,
        sender: mpsc::Sender<Outbound>,
        close: watch::Sender<Option<u16>>,
    ) -> Self {
        Self {
            member,
            sender,
            close,
        }
    }

    fn try_send(&self, item: Outbound) -> Result<(), mpsc::error::TrySendError<Outbound>> {
        self.sender.try_send(item)
    }

    /// Sever the connection without going through the (possibly full) queue.
    pub fn force_close(&self, code: u16) {
        let _ = self.close.send(Some(code));
    }
}

/// Outcome of a broadcast: the stamped id plus any members whose queue
/// overflowed and who must now be evicted by the caller.
#[derive(Debug)]
pub struct BroadcastOutcome {
    pub id: MessageId,
    pub overflowed: Vec<ConnectionId>,
}

/// Outcome of a unicast.
#[derive(Debug)]
pub struct UnicastOutcome {
    pub id: MessageId,
    pub overflowed: bool,
}

/// Echo settings for a client-originated broadcast: the originator receives
/// its own copy with `seq` attached, or nothing at all when excluded.
#[derive(Debug, Clone)]
pub struct OriginatorEcho {
    pub uid: ConnectionId,
    pub seq: Option<Number>,
    pub exclude: bool,
}

/// Per-broadcast options.
#[derive(Debug, Clone, Default)]
pub struct BroadcastOpts {
    pub originator: Option<OriginatorEcho>,
    /// Record the stamped envelope in the room's bounded history.
    pub record: bool,
}

impl BroadcastOpts {
    /// Options for a server-originated broadcast (presence events).
    pub fn server() -> Self {
        Self::default()
    }
}

#[derive(Debug, Default)]
struct RoomInner {
    members: HashMap<u64, MemberHandle>,
    history: VecDeque<Envelope>,
}

/// A named set of currently connected clients sharing a broadcast channel,
/// or the singleton null room (`name == None`) of unrouted clients.
#[derive(Debug)]
pub struct Room {
    name: Option<RoomName>,
    /// Allocator-issued room identifier; fresh per (re-)creation
    id: u64,
    created_at: Timestamp,
    ids: Arc<IdAllocator>,
    inner: Mutex<RoomInner>,
}

impl Room {
    fn new(name: Option<RoomName>, ids: Arc<IdAllocator>) -> Self {
        Self {
            name,
            id: ids.next(),
            created_at: Timestamp::new(now_millis()),
            ids,
            inner: Mutex::new(RoomInner::default()),
        }
    }

    pub fn name(&self) -> Option<&RoomName> {
        self.name.as_ref()
    }

    pub fn is_null(&self) -> bool {
        self.name.is_none()
    }

    /// Allocator-issued identifier; distinguishes re-creations of a name.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub async fn member_count(&self) -> usize {
        self.inner.lock().await.members.len()
    }

    /// Consistent who-is-here snapshot.
    pub async fn snapshot(&self) -> Vec<SnapshotEntry> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<SnapshotEntry> = inner
            .members
            .values()
            .map(|handle| SnapshotEntry::from(&handle.member))
            .collect();
        entries.sort_by(|a, b| a.uid.cmp(&b.uid));
        entries
    }

    /// Member descriptors, for the HTTP introspection surface.
    pub async fn members(&self) -> Vec<Member> {
        let inner = self.inner.lock().await;
        let mut members: Vec<Member> = inner
            .members
            .values()
            .map(|handle| handle.member.clone())
            .collect();
        members.sort_by_key(|member| member.uid);
        members
    }

    /// Recent broadcast envelopes, oldest first.
    pub async fn history(&self) -> Vec<Envelope> {
        self.inner.lock().await.history.iter().cloned().collect()
    }

    /// Update a member's nick. Returns the new nick if the member was found.
    pub async fn update_nick(&self, uid: ConnectionId, nick: Nick) -> Option<Nick> {
        let mut inner = self.inner.lock().await;
        let handle = inner.members.get_mut(&uid.as_u64())?;
        handle.member.nick = nick.clone();
        Some(nick)
    }

    /// Fan an envelope out to every current member.
    ///
    /// The envelope is stamped and serialized exactly once under the room
    /// lock; membership changes after this call do not retroactively
    /// include or exclude the frame. Fails on the null room.
    pub async fn broadcast(
        &self,
        mut envelope: Envelope,
        opts: BroadcastOpts,
    ) -> Result<BroadcastOutcome, RoomError> {
        if self.is_null() {
            return Err(RoomError::NoSuchRoom);
        }
        let mut inner = self.inner.lock().await;

        let id = MessageId::new(self.ids.next());
        envelope.stamp(id, IdAllocator::timestamp_of(id.as_u64()));
        let shared: Utf8Bytes = envelope.encode().into();

        let mut overflowed = Vec::new();
        for (raw_uid, handle) in inner.members.iter() {
            let uid = ConnectionId::new(*raw_uid);
            let frame = match &opts.originator {
                Some(echo) if echo.uid == uid => {
                    if echo.exclude {
                        continue;
                    }
                    let mut own = envelope.clone();
                    own.seq = echo.seq.clone();
                    Utf8Bytes::from(own.encode())
                }
                _ => shared.clone(),
            };
            match handle.try_send(Outbound::Frame(frame)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => overflowed.push(uid),
                // A closed queue means the member is mid-disconnect; its own
                // leave path cleans it up.
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }

        if opts.record {
            if inner.history.len() >= HISTORY_CAPACITY {
                inner.history.pop_front();
            }
            inner.history.push_back(envelope);
        }

        Ok(BroadcastOutcome { id, overflowed })
    }

    /// Stamp and enqueue an envelope on a single member's queue.
    /// Permitted on the null room.
    pub async fn unicast(
        &self,
        to: ConnectionId,
        mut envelope: Envelope,
    ) -> Result<UnicastOutcome, RoomError> {
        let inner = self.inner.lock().await;
        let handle = inner
            .members
            .get(&to.as_u64())
            .ok_or_else(|| RoomError::NoSuchMember(to.to_string()))?;

        let id = MessageId::new(self.ids.next());
        envelope.stamp(id, IdAllocator::timestamp_of(id.as_u64()));

        let overflowed = match handle.try_send(Outbound::Frame(envelope.encode().into())) {
            Ok(()) => false,
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        };
        Ok(UnicastOutcome { id, overflowed })
    }

    /// Queue an orderly close to every member; sever members whose queue is
    /// already full.
    pub async fn close_all(&self, code: u16) {
        let inner = self.inner.lock().await;
        for handle in inner.members.values() {
            if handle.try_send(Outbound::Close(code)).is_err() {
                handle.force_close(code);
            }
        }
    }

    /// Insert a member. Idempotent: a uid that is already present is left
    /// untouched and `false` is returned.
    async fn insert_member(&self, handle: MemberHandle) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.members.entry(handle.member.uid.as_u64()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(handle);
                true
            }
        }
    }

    async fn remove_member(&self, uid: ConnectionId) -> Option<MemberHandle> {
        self.inner.lock().await.members.remove(&uid.as_u64())
    }
}

/// Process-wide registry of live rooms.
///
/// Invariant: a named room is in the table exactly while it has members;
/// the null room is a permanent singleton outside the table.
#[derive(Debug)]
pub struct RoomGroup {
    rooms: Mutex<HashMap<String, Arc<Room>>>,
    null_room: Arc<Room>,
    ids: Arc<IdAllocator>,
}

impl RoomGroup {
    pub fn new() -> Self {
        let ids = Arc::new(IdAllocator::new());
        Self {
            rooms: Mutex::new(HashMap::new()),
            null_room: Arc::new(Room::new(None, Arc::clone(&ids))),
            ids,
        }
    }

    pub fn ids(&self) -> &Arc<IdAllocator> {
        &self.ids
    }

    /// Allocate a fresh connection identifier.
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId::new(self.ids.next())
    }

    pub fn null_room(&self) -> Arc<Room> {
        Arc::clone(&self.null_room)
    }

    pub async fn lookup(&self, name: &RoomName) -> Option<Arc<Room>> {
        self.rooms.lock().await.get(name.as_str()).cloned()
    }

    /// Find-or-create the target room and insert the member.
    ///
    /// `None` joins the null room. Returns the room and whether the member
    /// was actually inserted (idempotent re-join returns `false`).
    pub async fn join(&self, name: Option<&RoomName>, handle: MemberHandle) -> (Arc<Room>, bool) {
        let Some(name) = name else {
            let room = self.null_room();
            let inserted = room.insert_member(handle).await;
            return (room, inserted);
        };
        // Insert while the group lock is held, so a concurrent leave cannot
        // garbage-collect the room between creation and first membership.
        let mut rooms = self.rooms.lock().await;
        let room = rooms
            .entry(name.as_str().to_string())
            .or_insert_with(|| {
                debug!(room = name.as_str(), "room created");
                Arc::new(Room::new(Some(name.clone()), Arc::clone(&self.ids)))
            })
            .clone();
        let inserted = room.insert_member(handle).await;
        (room, inserted)
    }

    /// Remove a member from a room; a named room left empty is dropped from
    /// the table. Returns the removed handle, if the member was present.
    pub async fn leave(&self, room: &Arc<Room>, uid: ConnectionId) -> Option<MemberHandle> {
        if room.is_null() {
            return room.remove_member(uid).await;
        }
        // Group lock before room lock, so the emptiness check and the table
        // removal cannot race a concurrent join.
        let mut rooms = self.rooms.lock().await;
        let handle = room.remove_member(uid).await;
        if handle.is_some() && room.member_count().await == 0 {
            if let Some(name) = room.name()
                && rooms
                    .get(name.as_str())
                    .is_some_and(|live| Arc::ptr_eq(live, room))
            {
                rooms.remove(name.as_str());
                debug!(room = name.as_str(), "room destroyed");
            }
        }
        handle
    }

    /// Names, sizes and creation stamps of all live rooms.
    pub async fn rooms_overview(&self) -> Vec<(RoomName, usize, Timestamp)> {
        let rooms: Vec<Arc<Room>> = self.rooms.lock().await.values().cloned().collect();
        let mut overview = Vec::with_capacity(rooms.len());
        for room in rooms {
            if let Some(name) = room.name() {
                overview.push((name.clone(), room.member_count().await, room.created_at()));
            }
        }
        overview.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        overview
    }

    /// Queue an orderly close to every connected client, in every room.
    pub async fn close_all(&self, code: u16) {
        let rooms: Vec<Arc<Room>> = self.rooms.lock().await.values().cloned().collect();
        for room in rooms {
            room.close_all(code).await;
        }
        self.null_room.close_all(code).await;
    }
}

impl Default for RoomGroup {
    fn default() -> Self {
        Self::new()
    }
}
