//! Connection admission for Realmgate.
//!
//! A transport connection is anonymous until it proves, through the
//! identity service, which character it may control. This crate keeps
//! the bookkeeping for that:
//!
//! 1. **Admission**: every connection gets a deadline to authenticate
//!    ([`SessionConfig::admission_timeout`]).
//! 2. **Handshake**: one live [`HandshakeAttempt`] per connection, with
//!    the abort handle of its verification task.
//! 3. **Binding**: the explicit `connection → entity` table
//!    ([`Gatekeeper::entity_of`]).
//!
//! # How it fits in the stack
//!
//! ```text
//! Authority loop (above)  ← owns the Gatekeeper, spawns verifications
//!     ↕
//! Session Layer (this crate)  ← admission state per connection
//!     ↕
//! Transport / Protocol (below)  ← ConnectionId, EntityId, CharacterId
//! ```

mod attempt;
mod config;
mod error;
mod gatekeeper;

pub use attempt::{AttemptId, HandshakeAttempt, HandshakeTicket};
pub use config::SessionConfig;
pub use error::GateError;
pub use gatekeeper::{ConnectionState, Gatekeeper};
