//! The authoritative world for Realmgate.
//!
//! - [`MovementAuthority`] owns every [`Entity`] and is the only code
//!   that changes positions or movement states.
//! - [`NavigableSurface`] answers "where is the nearest walkable point?"
//!   ([`FlatGround`], [`NavAreas`]).
//! - [`StateReplicator`] stamps every change with a tick and a
//!   per-entity revision for broadcast.
//!
//! Nothing in this crate is async. The authority loop in the `realmgate`
//! crate calls into it from a single task.

mod authority;
mod config;
mod entity;
mod error;
mod navigation;
mod replicator;

pub use authority::MovementAuthority;
pub use config::MovementConfig;
pub use entity::{Entity, EntityProfile};
pub use error::MoveError;
pub use navigation::{FlatGround, NAV_EPSILON, NavArea, NavAreas, NavigableSurface};
pub use replicator::StateReplicator;
