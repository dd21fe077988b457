//! # Realmgate
//!
//! Authoritative session gateway and movement server for a persistent
//! game world.
//!
//! A client connects, presents a token and a character id, and the
//! server checks both against an external identity service before it
//! places that character in the world. From then on the server alone
//! moves the character: the client only asks for destinations, and every
//! change is replicated to all connected players.
//!
//! ```text
//! WebSocketTransport ─→ handler ─→ AuthorityLoop ─→ Gatekeeper
//!                                       │            MovementAuthority
//!                                       └─ verify ─→ IdentityVerifier
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use realmgate::prelude::*;
//!
//! # async fn run() -> Result<(), RealmgateError> {
//! let config = ServerConfig::from_env();
//! let verifier = HttpIdentityClient::new(config.identity.clone())?;
//! let server = RealmgateServerBuilder::new()
//!     .config(config)
//!     .build(verifier)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod authority;
mod client;
mod config;
mod error;
mod handler;
mod server;
mod spawner;

pub use client::{ClientConfig, ClientError, GameClient};
pub use config::{DEFAULT_SPAWN_POINT, ServerConfig};
pub use error::RealmgateError;
pub use server::{RealmgateServer, RealmgateServerBuilder};
pub use spawner::SessionSpawner;

/// Everything needed to run a server or a client.
pub mod prelude {
    pub use crate::{
        ClientConfig, ClientError, GameClient, RealmgateError, RealmgateServer,
        RealmgateServerBuilder, ServerConfig, SessionSpawner,
    };
    pub use realmgate_identity::{
        CharacterRecord, HttpIdentityClient, IdentityConfig, IdentityVerifier, OwnerCheck,
        VerificationError,
    };
    pub use realmgate_protocol::{
        CharacterId, ClientMessage, EntityId, EntitySnapshot, MovementState, ReplicaView,
        ServerMessage, StateUpdate, Vec3,
    };
    pub use realmgate_session::SessionConfig;
    pub use realmgate_tick::TickConfig;
    pub use realmgate_world::{FlatGround, MovementConfig, NavArea, NavAreas, NavigableSurface};
}
