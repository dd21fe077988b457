//! Error types for the admission gate.

use realmgate_transport::ConnectionId;

use crate::AttemptId;

/// A gate operation that does not apply to the connection's current
/// state.
///
/// None of these are fatal for the server: the authority loop logs them
/// and drops the offending message or result.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GateError {
    /// The connection is not tracked (never accepted, or already gone).
    #[error("connection {0} is not tracked")]
    NotFound(ConnectionId),

    /// `accept` was called twice for the same connection.
    #[error("connection {0} is already tracked")]
    AlreadyTracked(ConnectionId),

    /// A handshake is already being verified for this connection.
    #[error("connection {0} already has a handshake in flight")]
    HandshakeInFlight(ConnectionId),

    /// The connection is bound; handshakes are honored once.
    #[error("connection {0} is already bound")]
    AlreadyBound(ConnectionId),

    /// The connection was rejected or timed out and is only waiting for
    /// the transport to close.
    #[error("connection {0} is closed")]
    Closed(ConnectionId),

    /// The operation needs a connection in `Authenticating`.
    #[error("connection {0} is not authenticating")]
    NotAuthenticating(ConnectionId),

    /// A verification result or task handle belongs to an attempt that is
    /// no longer the live one.
    #[error("attempt {attempt_id} is stale for connection {connection_id}")]
    StaleAttempt {
        connection_id: ConnectionId,
        attempt_id: AttemptId,
    },
}
