//! Error types for movement commands.

use realmgate_protocol::{EntityId, Vec3};
use realmgate_transport::ConnectionId;

/// Why a movement command was not applied.
///
/// All of these are dropped by the authority loop after logging; none is
/// ever reported to the client.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MoveError {
    /// No entity with this id exists.
    #[error("entity {0} does not exist")]
    UnknownEntity(EntityId),

    /// The requesting connection does not own the entity.
    #[error("{requester} does not own entity {entity_id}")]
    Unauthorized {
        entity_id: EntityId,
        requester: ConnectionId,
    },

    /// No navigable point lies within the search radius of the
    /// destination.
    #[error("no navigable point near {destination} for entity {entity_id}")]
    InvalidDestination {
        entity_id: EntityId,
        destination: Vec3,
    },

    /// Dead entities do not move.
    #[error("entity {0} is dead")]
    EntityDead(EntityId),
}
