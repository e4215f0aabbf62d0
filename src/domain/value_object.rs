//! Value Objects for domain models.
//!
//! Value Objects are immutable objects that represent values in the domain.
//! They are compared by their value, not by identity.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::ValueObjectError;

/// Grammar for room names: a letter, then letters/digits/`_`/`-`, ending in a
/// letter or digit. Single-letter names are allowed. Shared with the URL
/// router and the redirect rules.
pub const ROOM_NAME_PATTERN: &str = "[a-zA-Z](?:[a-zA-Z0-9_-]*[a-zA-Z0-9])?";

static ROOM_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^{ROOM_NAME_PATTERN}$")).unwrap());

/// Maximum accepted nick length, in characters.
pub const NICK_MAX_CHARS: usize = 256;

/// Server-assigned identifier of a live WebSocket session.
///
/// Unique for the lifetime of the process; embedded as the client's user id
/// in wire envelopes (in decimal string form).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Parse the decimal string form used on the wire.
    pub fn parse(s: &str) -> Result<Self, ValueObjectError> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| ValueObjectError::ConnectionIdInvalid(s.to_string()))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-assigned identifier of a single envelope.
///
/// The wire form is the decimal string of a monotonic 64-bit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(u64);

impl MessageId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Room name value object.
///
/// Validated against the room-name grammar shared with the URL router, so a
/// `RoomName` can always round-trip through a `/room/<name>/` path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomName(String);

impl RoomName {
    pub fn new(name: String) -> Result<Self, ValueObjectError> {
        if !ROOM_NAME_RE.is_match(&name) {
            return Err(ValueObjectError::RoomNameInvalid(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display nick of a connected client.
///
/// At most [`NICK_MAX_CHARS`] characters and no control characters. A client
/// that has not chosen a nick carries the anonymous default.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Nick(String);

impl Nick {
    pub fn new(nick: String) -> Result<Self, ValueObjectError> {
        let chars = nick.chars().count();
        if chars > NICK_MAX_CHARS {
            return Err(ValueObjectError::NickTooLong {
                max: NICK_MAX_CHARS,
                actual: chars,
            });
        }
        if nick.chars().any(char::is_control) {
            return Err(ValueObjectError::NickControlChars);
        }
        Ok(Self(nick))
    }

    /// Default nick of a client that has not sent a `nick` envelope yet.
    pub fn anonymous() -> Self {
        Self("anonymous".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timestamp value object: Unix epoch milliseconds, UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_parse_roundtrip() {
        // given:
        let id = ConnectionId::new(1234567890);

        // when:
        let parsed = ConnectionId::parse(&id.to_string());

        // then:
        assert_eq!(parsed, Ok(id));
    }

    #[test]
    fn test_connection_id_parse_rejects_non_decimal() {
        // when:
        let result = ConnectionId::parse("ZZZ");

        // then:
        assert_eq!(
            result,
            Err(ValueObjectError::ConnectionIdInvalid("ZZZ".to_string()))
        );
    }

    #[test]
    fn test_room_name_accepts_grammar() {
        // then:
        assert!(RoomName::new("welcome".to_string()).is_ok());
        assert!(RoomName::new("a".to_string()).is_ok());
        assert!(RoomName::new("a-b_c9".to_string()).is_ok());
    }

    #[test]
    fn test_room_name_rejects_bad_shapes() {
        // then: must start with a letter and end with a letter or digit
        assert!(RoomName::new(String::new()).is_err());
        assert!(RoomName::new("9room".to_string()).is_err());
        assert!(RoomName::new("room-".to_string()).is_err());
        assert!(RoomName::new("room name".to_string()).is_err());
        assert!(RoomName::new("room/ws".to_string()).is_err());
    }

    #[test]
    fn test_nick_accepts_up_to_max_chars() {
        // given:
        let nick = "n".repeat(NICK_MAX_CHARS);

        // then:
        assert!(Nick::new(nick).is_ok());
    }

    #[test]
    fn test_nick_rejects_too_long() {
        // given:
        let nick = "n".repeat(NICK_MAX_CHARS + 1);

        // when:
        let result = Nick::new(nick);

        // then:
        assert_eq!(
            result,
            Err(ValueObjectError::NickTooLong {
                max: NICK_MAX_CHARS,
                actual: NICK_MAX_CHARS + 1
            })
        );
    }

    #[test]
    fn test_nick_rejects_control_chars() {
        // when:
        let result = Nick::new("a\x07b".to_string());

        // then:
        assert_eq!(result, Err(ValueObjectError::NickControlChars));
    }

    #[test]
    fn test_nick_anonymous_default() {
        // then:
        assert_eq!(Nick::anonymous().as_str(), "anonymous");
    }
}
