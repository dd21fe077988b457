//! Wire protocol for Realmgate.
//!
//! This crate defines the "language" that game clients and the server
//! speak:
//!
//! - **Types** ([`ClientMessage`], [`ServerMessage`], [`StateUpdate`],
//!   [`Vec3`], ids): the structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages
//!   become bytes.
//! - **Replica** ([`ReplicaView`]): how an observer applies replicated
//!   updates without ever going backwards.
//! - **Errors** ([`ProtocolError`]).
//!
//! The protocol layer knows nothing about connections, sessions, or the
//! simulation loop.
//!
//! ```text
//! Transport (bytes) → Protocol (messages) → Session / World
//! ```

mod codec;
mod error;
mod replica;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use replica::{ApplyOutcome, ReplicaView, ReplicatedEntity};
pub use types::{
    CharacterId, ClientMessage, EntityId, EntitySnapshot, MovementState, ServerMessage,
    StateUpdate, Vec3,
};
