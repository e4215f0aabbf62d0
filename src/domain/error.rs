//! Domain layer error definitions.

use thiserror::Error;

/// Errors related to Value Objects validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueObjectError {
    /// Room name rejected by the room-name grammar
    #[error("room name must start with a letter and end with a letter or digit (got: {0:?})")]
    RoomNameInvalid(String),

    /// Nick too long error
    #[error("nick cannot exceed {max} characters (got {actual})")]
    NickTooLong { max: usize, actual: usize },

    /// Nick contains control characters
    #[error("nick cannot contain control characters")]
    NickControlChars,

    /// Connection identifier is not a decimal 64-bit value
    #[error("connection id must be a decimal 64-bit value (got: {0:?})")]
    ConnectionIdInvalid(String),
}

/// Errors related to Room and RoomGroup operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoomError {
    /// The operation needs a named room (e.g. broadcasting into the null room)
    #[error("no such room")]
    NoSuchRoom,

    /// Unicast target is not a member of the room
    #[error("no such member: {0}")]
    NoSuchMember(String),
}

/// Errors produced while decoding an inbound wire envelope
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Frame is not a JSON object carrying the reserved envelope fields
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
}
