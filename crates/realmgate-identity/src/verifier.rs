//! The verification seam between the handshake gate and the identity
//! service.
//!
//! The server never decides on its own who a character belongs to. It
//! hands the client's token and character id to an [`IdentityVerifier`]
//! and trusts only what comes back. Production uses
//! [`HttpIdentityClient`](crate::HttpIdentityClient); tests plug in a
//! scripted verifier.

use realmgate_protocol::CharacterId;

use crate::{CharacterRecord, VerificationError};

/// Resolves a `(token, character id)` pair to a trusted character record.
///
/// `Send + Sync + 'static` because one verifier is shared by every
/// in-flight handshake task for the lifetime of the server.
///
/// # Example
///
/// ```rust
/// use realmgate_identity::{CharacterRecord, IdentityVerifier, VerificationError};
/// use realmgate_protocol::{CharacterId, Vec3};
///
/// /// Accepts the token "letmein" for any character. Local testing only.
/// struct OpenDoor;
///
/// impl IdentityVerifier for OpenDoor {
///     async fn verify(
///         &self,
///         token: &str,
///         character_id: CharacterId,
///     ) -> Result<CharacterRecord, VerificationError> {
///         if token != "letmein" {
///             return Err(VerificationError::TokenRejected("wrong password".into()));
///         }
///         Ok(CharacterRecord {
///             id: character_id,
///             owner: None,
///             name: "Guest".into(),
///             race: "Humano".into(),
///             character_class: "Guerrero".into(),
///             position: Vec3::ZERO,
///         })
///     }
/// }
/// ```
pub trait IdentityVerifier: Send + Sync + 'static {
    /// Verifies the token, then fetches the character scoped to it.
    ///
    /// Any `Err` means the handshake must be rejected; no partial result
    /// is ever returned.
    fn verify(
        &self,
        token: &str,
        character_id: CharacterId,
    ) -> impl std::future::Future<Output = Result<CharacterRecord, VerificationError>> + Send;
}
