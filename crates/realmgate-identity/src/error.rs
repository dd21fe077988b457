//! Error types for identity verification.

use crate::AccountId;

/// Why a `verify` call did not produce a trusted character record.
///
/// Every variant is a verification *failure*: the handshake is rejected
/// and nothing from a partially successful call is trusted. The variants
/// only exist so logs can say which step failed.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    /// The request was unusable before any network call (empty token,
    /// non-positive character id).
    #[error("invalid verification request: {0}")]
    InvalidRequest(String),

    /// Step 1 failed: the identity service did not accept the token.
    #[error("token rejected: {0}")]
    TokenRejected(String),

    /// Step 2 failed: the character could not be fetched for this token.
    #[error("character unavailable: {0}")]
    CharacterUnavailable(String),

    /// The character belongs to a different account than the token.
    #[error("character owned by account {actual:?}, token belongs to {expected}")]
    OwnerMismatch {
        expected: AccountId,
        actual: Option<AccountId>,
    },

    /// The identity service could not be reached, or timed out.
    #[error("identity service unreachable: {0}")]
    Unreachable(String),

    /// The identity service answered 2xx with a body we could not parse.
    #[error("malformed identity response: {0}")]
    MalformedResponse(String),

    /// The HTTP client could not be constructed.
    #[error("identity client configuration: {0}")]
    Configuration(String),
}

impl VerificationError {
    /// The reason shown to the game client. Deliberately vague: the
    /// client learns that the handshake failed, not which check failed.
    pub fn client_reason(&self) -> &'static str {
        match self {
            Self::Unreachable(_) | Self::Configuration(_) => {
                "identity service unavailable, try again later"
            }
            _ => "invalid token or character",
        }
    }
}
