//! Unified error type for Realmgate.

use realmgate_identity::VerificationError;
use realmgate_protocol::ProtocolError;
use realmgate_session::GateError;
use realmgate_transport::TransportError;
use realmgate_world::MoveError;

use crate::ClientError;

/// Top-level error that wraps every crate-specific error.
///
/// `#[from]` on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum RealmgateError {
    /// Listener, connection, send or receive failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encode or decode failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Identity verification failure.
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// Admission gate refused an operation.
    #[error(transparent)]
    Gate(#[from] GateError),

    /// Movement command refused.
    #[error(transparent)]
    Move(#[from] MoveError),

    /// Game client failure.
    #[error(transparent)]
    Client(#[from] ClientError),
}
