//! Use-case layer error definitions.

use thiserror::Error;

/// Fatal outcome of handling one inbound frame: the session must end.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The client's own send queue overflowed; the connection is closed
    /// with code 1011 and a leave presence is emitted.
    #[error("send queue overflow")]
    QueueOverflow,
}
