//! Core domain models for the chat server.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use super::value_object::{ConnectionId, Nick, Timestamp};

/// A client currently connected to a room.
///
/// The per-connection task owns the live socket; rooms only hold this
/// descriptor next to the client's send handle and drop it on disconnect.
#[derive(Debug, Clone)]
pub struct Member {
    /// Server-assigned connection identifier
    pub uid: ConnectionId,
    /// Current display nick
    pub nick: Nick,
    /// Timestamp when the member joined
    pub connected_at: Timestamp,
    /// Remote peer address, when known
    pub remote_addr: Option<SocketAddr>,
    /// HTTP User-Agent presented at upgrade
    pub user_agent: Option<String>,
    /// HTTP Referer presented at upgrade
    pub referer: Option<String>,
    /// Session identifier taken from the verified identity cookie
    pub session_id: Option<String>,
}

impl Member {
    /// Create a member with the anonymous default nick.
    pub fn new(uid: ConnectionId, connected_at: Timestamp) -> Self {
        Self {
            uid,
            nick: Nick::anonymous(),
            connected_at,
            remote_addr: None,
            user_agent: None,
            referer: None,
            session_id: None,
        }
    }
}

/// One row of a consistent who-is-here snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub uid: String,
    pub nick: String,
}

impl From<&Member> for SnapshotEntry {
    fn from(member: &Member) -> Self {
        Self {
            uid: member.uid.to_string(),
            nick: member.nick.as_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_defaults_to_anonymous_nick() {
        // given:
        let member = Member::new(ConnectionId::new(7), Timestamp::new(1000));

        // then:
        assert_eq!(member.nick, Nick::anonymous());
        assert_eq!(member.connected_at, Timestamp::new(1000));
        assert!(member.session_id.is_none());
    }

    #[test]
    fn test_snapshot_entry_uses_wire_forms() {
        // given:
        let mut member = Member::new(ConnectionId::new(42), Timestamp::new(0));
        member.nick = Nick::new("ada".to_string()).unwrap();

        // when:
        let entry = SnapshotEntry::from(&member);

        // then:
        assert_eq!(entry.uid, "42");
        assert_eq!(entry.nick, "ada");
    }
}
