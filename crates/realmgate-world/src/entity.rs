//! Authoritative entities.

use realmgate_protocol::{CharacterId, EntityId, EntitySnapshot, MovementState, Vec3};
use realmgate_transport::ConnectionId;

/// Who an entity represents, copied from the verified character record.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityProfile {
    pub character_id: CharacterId,
    pub name: String,
    pub race: String,
    pub character_class: String,
}

/// A character in the world, owned by exactly one bound connection.
///
/// Fields are private: position and movement state change only through
/// the [`MovementAuthority`](crate::MovementAuthority), and the owner is
/// fixed at creation.
#[derive(Debug, Clone)]
pub struct Entity {
    pub(crate) id: EntityId,
    pub(crate) owner: ConnectionId,
    pub(crate) profile: EntityProfile,
    pub(crate) position: Vec3,
    pub(crate) state: MovementState,
    /// Resolved destination. `Some` whenever `state` is `Moving`.
    pub(crate) path_target: Option<Vec3>,
    pub(crate) velocity: Vec3,
    /// Yaw in degrees, `0..360`, 0 facing +Z.
    pub(crate) facing: f32,
}

impl Entity {
    pub(crate) fn new(
        id: EntityId,
        owner: ConnectionId,
        profile: EntityProfile,
        position: Vec3,
    ) -> Self {
        Self {
            id,
            owner,
            profile,
            position,
            state: MovementState::Idle,
            path_target: None,
            velocity: Vec3::ZERO,
            facing: 0.0,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn owner(&self) -> ConnectionId {
        self.owner
    }

    pub fn profile(&self) -> &EntityProfile {
        &self.profile
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn state(&self) -> MovementState {
        self.state
    }

    pub fn path_target(&self) -> Option<Vec3> {
        self.path_target
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn facing(&self) -> f32 {
        self.facing
    }

    /// Drops the active path and any residual velocity.
    pub(crate) fn clear_path(&mut self) {
        self.path_target = None;
        self.velocity = Vec3::ZERO;
    }

    /// Full snapshot for observers, stamped with the entity's current
    /// replication revision.
    pub fn snapshot(&self, revision: u64) -> EntitySnapshot {
        EntitySnapshot {
            entity_id: self.id,
            character_id: self.profile.character_id,
            name: self.profile.name.clone(),
            race: self.profile.race.clone(),
            character_class: self.profile.character_class.clone(),
            position: self.position,
            state: self.state,
            revision,
        }
    }
}

/// Yaw in degrees of a horizontal direction, 0 along +Z, 90 along +X.
pub(crate) fn yaw_of(direction: Vec3) -> Option<f32> {
    if direction.x.abs() <= f32::EPSILON && direction.z.abs() <= f32::EPSILON {
        return None;
    }
    Some(direction.x.atan2(direction.z).to_degrees().rem_euclid(360.0))
}

/// Turns `current` toward `target` by at most `max_step` degrees along
/// the shorter arc.
pub(crate) fn turn_toward(current: f32, target: f32, max_step: f32) -> f32 {
    let delta = (target - current + 540.0).rem_euclid(360.0) - 180.0;
    let step = delta.clamp(-max_step, max_step);
    (current + step).rem_euclid(360.0)
}
