//! Identity verification for Realmgate handshakes.
//!
//! A game client proves who it is with a token issued by the external
//! identity service and names the character it wants to control. This
//! crate turns that claim into a trusted [`CharacterRecord`]:
//!
//! 1. `POST {base}/auth/validate` with `{"Token": ...}` → account id
//! 2. `GET {base}/characters/{id}` with `Authorization: Bearer <token>`
//!    → the character, scoped by the service to the token's account
//! 3. [`OwnerCheck`] cross-checks the record's owner against step 1
//!
//! Any failure along the way is a [`VerificationError`] and the record is
//! never produced.
//!
//! # How it fits in the stack
//!
//! ```text
//! Session gate (above)  ← spawns one verification per handshake
//!     ↕
//! Identity (this crate) ← talks HTTP to the identity service
//! ```

#![allow(async_fn_in_trait)]

mod client;
mod error;
mod record;
mod verifier;

pub use client::{HttpIdentityClient, IdentityConfig};
pub use error::VerificationError;
pub use record::{AccountId, CharacterRecord, OwnerCheck};
pub use verifier::IdentityVerifier;
