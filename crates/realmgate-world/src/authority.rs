//! The movement authority: the sole writer of entity position and
//! movement state.
//!
//! ```text
//!   Idle ──(request_move, valid destination)──→ Moving
//!     ↑                                           │
//!     └────────(arrival | target left surface)────┘
//!
//!   kill(): Idle | Moving ──→ Dead   (terminal for movement)
//!   teleport(): clears the path, Moving ──→ Idle
//! ```
//!
//! Clients only ever *ask* for a destination. The authority snaps it to
//! the navigable surface, rejects requests from connections that do not
//! own the entity, and advances entities itself on every tick. Every
//! change is published to the [`StateReplicator`].

use std::collections::BTreeMap;

use realmgate_protocol::{EntityId, EntitySnapshot, MovementState, StateUpdate, Vec3};
use realmgate_transport::ConnectionId;

use crate::entity::{turn_toward, yaw_of};
use crate::{Entity, EntityProfile, MoveError, MovementConfig, NavigableSurface, StateReplicator};

/// Owns every entity and moves them.
pub struct MovementAuthority {
    config: MovementConfig,
    surface: Box<dyn NavigableSurface>,
    entities: BTreeMap<EntityId, Entity>,
    replicator: StateReplicator,
    next_entity_id: u64,
    /// Tick most recently simulated; stamps changes made between ticks.
    current_tick: u64,
}

impl MovementAuthority {
    pub fn new(config: MovementConfig, surface: impl NavigableSurface) -> Self {
        Self {
            config,
            surface: Box::new(surface),
            entities: BTreeMap::new(),
            replicator: StateReplicator::new(),
            next_entity_id: 1,
            current_tick: 0,
        }
    }

    pub fn config(&self) -> &MovementConfig {
        &self.config
    }

    /// Swaps the navigable surface (e.g. after the level changed).
    /// Entities heading for a target that is no longer navigable stop on
    /// the next tick.
    pub fn set_surface(&mut self, surface: impl NavigableSurface) {
        self.surface = Box::new(surface);
    }

    pub fn surface(&self) -> &dyn NavigableSurface {
        self.surface.as_ref()
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Creates an `Idle` entity at `position`, owned by `owner`.
    ///
    /// The position is taken as-is; callers that want it on the surface
    /// follow up with [`teleport`](Self::teleport).
    pub fn spawn(&mut self, owner: ConnectionId, profile: EntityProfile, position: Vec3) -> EntityId {
        let id = EntityId(self.next_entity_id);
        self.next_entity_id += 1;

        tracing::info!(
            entity_id = %id,
            %owner,
            character_id = %profile.character_id,
            %position,
            "entity spawned"
        );

        self.entities.insert(id, Entity::new(id, owner, profile, position));
        self.replicator.register(id);
        id
    }

    /// Removes an entity and everything queued for it.
    pub fn remove(&mut self, entity_id: EntityId) -> Option<Entity> {
        let entity = self.entities.remove(&entity_id)?;
        self.replicator.forget(entity_id);
        tracing::info!(%entity_id, owner = %entity.owner, "entity removed");
        Some(entity)
    }

    // -----------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------

    /// Points an entity at a new destination on behalf of `requester`.
    ///
    /// Only the owner may move its entity. The destination is snapped to
    /// the nearest navigable point within `path_search_radius`; if there
    /// is none, nothing changes. A new order replaces any current one.
    pub fn request_move(
        &mut self,
        entity_id: EntityId,
        destination: Vec3,
        requester: ConnectionId,
    ) -> Result<Vec3, MoveError> {
        let entity = self
            .entities
            .get_mut(&entity_id)
            .ok_or(MoveError::UnknownEntity(entity_id))?;

        if entity.owner != requester {
            return Err(MoveError::Unauthorized {
                entity_id,
                requester,
            });
        }
        if entity.state == MovementState::Dead {
            return Err(MoveError::EntityDead(entity_id));
        }

        let target = self
            .surface
            .sample(destination, self.config.path_search_radius)
            .ok_or(MoveError::InvalidDestination {
                entity_id,
                destination,
            })?;

        entity.path_target = Some(target);
        tracing::debug!(%entity_id, %destination, %target, "move accepted");

        if entity.state != MovementState::Moving {
            entity.state = MovementState::Moving;
            self.replicator.publish(
                entity_id,
                self.current_tick,
                MovementState::Moving,
                entity.position,
            );
        }
        Ok(target)
    }

    /// Moves an entity instantly, bypassing pathing.
    ///
    /// Any active path is cleared first. The position is snapped to the
    /// surface within `teleport_search_radius`; with no point in range
    /// the raw position is used. Returns where the entity landed.
    pub fn teleport(&mut self, entity_id: EntityId, position: Vec3) -> Result<Vec3, MoveError> {
        let entity = self
            .entities
            .get_mut(&entity_id)
            .ok_or(MoveError::UnknownEntity(entity_id))?;

        entity.clear_path();
        if entity.state == MovementState::Moving {
            entity.state = MovementState::Idle;
        }

        let landed = match self
            .surface
            .sample(position, self.config.teleport_search_radius)
        {
            Some(p) => p,
            None => {
                tracing::warn!(%entity_id, %position, "no navigable point near teleport target, using raw position");
                position
            }
        };
        entity.position = landed;

        self.replicator
            .publish(entity_id, self.current_tick, entity.state, landed);
        tracing::debug!(%entity_id, %landed, "entity teleported");
        Ok(landed)
    }

    /// Kills an entity. Dead entities keep their position and never move
    /// again.
    pub fn kill(&mut self, entity_id: EntityId) -> Result<(), MoveError> {
        let entity = self
            .entities
            .get_mut(&entity_id)
            .ok_or(MoveError::UnknownEntity(entity_id))?;

        entity.clear_path();
        if entity.state != MovementState::Dead {
            entity.state = MovementState::Dead;
            self.replicator
                .publish(entity_id, self.current_tick, MovementState::Dead, entity.position);
            tracing::info!(%entity_id, "entity died");
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Simulation
    // -----------------------------------------------------------------

    /// Advances every moving entity by `dt` seconds.
    ///
    /// Publishes at most one change per entity per tick, carrying both the
    /// new position and, on arrival, the `Idle` transition.
    pub fn tick(&mut self, dt: f32, tick: u64) {
        self.current_tick = tick;
        let step = self.config.move_speed * dt;
        let max_turn = self.config.turn_rate_deg_per_sec() * dt;
        let stopping = self.config.stopping_distance;

        for entity in self.entities.values_mut() {
            if entity.state != MovementState::Moving {
                continue;
            }

            let target = match entity.path_target {
                Some(t) if self.surface.is_navigable(t) => t,
                lost => {
                    entity.clear_path();
                    entity.state = MovementState::Idle;
                    self.replicator
                        .publish(entity.id, tick, MovementState::Idle, entity.position);
                    tracing::debug!(entity_id = %entity.id, target = ?lost, "path lost, stopping");
                    continue;
                }
            };

            let to_target = target - entity.position;
            let distance = to_target.length();

            if distance > stopping {
                if let Some(direction) = to_target.normalized() {
                    entity.position = entity.position + direction * step.min(distance);
                    entity.velocity = direction * self.config.move_speed;
                    if let Some(yaw) = yaw_of(direction) {
                        entity.facing = turn_toward(entity.facing, yaw, max_turn);
                    }
                }
            }

            // Brake inside the stopping distance; arrival needs both the
            // distance and no residual velocity.
            if entity.position.distance(target) <= stopping {
                entity.velocity = Vec3::ZERO;
            }
            let arrived = entity.position.distance(target) <= stopping && entity.velocity.is_zero();
            if arrived {
                entity.clear_path();
                entity.state = MovementState::Idle;
                tracing::debug!(entity_id = %entity.id, position = %entity.position, "arrived");
            }

            self.replicator
                .publish(entity.id, tick, entity.state, entity.position);
        }
    }

    /// Takes every change published since the last drain.
    pub fn drain_updates(&mut self) -> Vec<StateUpdate> {
        self.replicator.drain()
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    pub fn get(&self, entity_id: EntityId) -> Option<&Entity> {
        self.entities.get(&entity_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Snapshot of one entity at its current revision.
    pub fn snapshot(&self, entity_id: EntityId) -> Option<EntitySnapshot> {
        self.entities
            .get(&entity_id)
            .map(|e| e.snapshot(self.replicator.revision(entity_id)))
    }

    /// Snapshots of every entity, in id order.
    pub fn snapshots(&self) -> Vec<EntitySnapshot> {
        self.entities
            .values()
            .map(|e| e.snapshot(self.replicator.revision(e.id)))
            .collect()
    }

    pub fn revision(&self, entity_id: EntityId) -> u64 {
        self.replicator.revision(entity_id)
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }
}
