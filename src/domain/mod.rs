//! Domain layer for the chat server.
//!
//! This module contains business logic that is independent of
//! transport concerns and infrastructure.

pub mod entity;
pub mod envelope;
pub mod error;
pub mod value_object;

pub use entity::{Member, SnapshotEntry};
pub use envelope::{Envelope, SERVER_SENTINEL};
pub use error::{EnvelopeError, RoomError, ValueObjectError};
pub use value_object::{ConnectionId, MessageId, Nick, ROOM_NAME_PATTERN, RoomName, Timestamp};
