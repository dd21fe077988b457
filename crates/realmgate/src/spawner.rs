//! Turns a verified character record into a live entity.

use realmgate_identity::CharacterRecord;
use realmgate_protocol::{EntityId, Vec3};
use realmgate_transport::ConnectionId;
use realmgate_world::{EntityProfile, MovementAuthority};

/// Places freshly verified characters into the world.
#[derive(Debug, Clone)]
pub struct SessionSpawner {
    default_spawn: Vec3,
}

impl SessionSpawner {
    pub fn new(default_spawn: Vec3) -> Self {
        Self { default_spawn }
    }

    pub fn default_spawn(&self) -> Vec3 {
        self.default_spawn
    }

    /// The character's saved position, or the default spawn point when
    /// the saved position is the origin (a character that never played).
    pub fn spawn_position(&self, record: &CharacterRecord) -> Vec3 {
        if record.position.is_zero() {
            self.default_spawn
        } else {
            record.position
        }
    }

    /// Creates the entity for `owner` and teleports it onto the surface.
    pub fn spawn(
        &self,
        world: &mut MovementAuthority,
        owner: ConnectionId,
        record: &CharacterRecord,
    ) -> EntityId {
        let position = self.spawn_position(record);
        let entity_id = world.spawn(owner, profile_of(record), position);

        // The entity was created on the line above, so teleport cannot
        // miss it; the raw position is kept if the surface has no point
        // in range.
        if let Err(e) = world.teleport(entity_id, position) {
            tracing::warn!(%entity_id, error = %e, "spawn teleport failed");
        }
        entity_id
    }
}

pub(crate) fn profile_of(record: &CharacterRecord) -> EntityProfile {
    EntityProfile {
        character_id: record.id,
        name: record.name.clone(),
        race: record.race.clone(),
        character_class: record.character_class.clone(),
    }
}
