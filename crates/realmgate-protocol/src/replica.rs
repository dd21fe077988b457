//! Observer-side view of replicated entities.
//!
//! The server publishes every change with a per-entity `revision`. A
//! [`ReplicaView`] applies a change only when its revision is newer than
//! the last one applied for that entity, which gives observers the
//! ordering guarantee the replicator promises:
//!
//! - a duplicate delivery (same revision) is a no-op,
//! - an older delivery never overwrites a newer one.
//!
//! Entity ids are never reused, so a despawned id is remembered and any
//! straggling update for it is ignored.

use std::collections::{HashMap, HashSet};

use crate::{EntityId, EntitySnapshot, MovementState, ServerMessage, StateUpdate, Vec3};

/// What happened when an update was offered to the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The update was newer and is now reflected in the view.
    Applied,
    /// The update was a duplicate or older than what the view holds.
    Stale,
    /// The entity is unknown (never spawned, or already despawned).
    Unknown,
}

/// The latest known state of one replicated entity.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicatedEntity {
    pub snapshot: EntitySnapshot,
    /// Tick of the last applied update (0 until the first update).
    pub tick: u64,
}

impl ReplicatedEntity {
    pub fn state(&self) -> MovementState {
        self.snapshot.state
    }

    pub fn position(&self) -> Vec3 {
        self.snapshot.position
    }

    pub fn revision(&self) -> u64 {
        self.snapshot.revision
    }
}

/// Client-side table of entities built from replicated messages.
#[derive(Debug, Default)]
pub struct ReplicaView {
    entities: HashMap<EntityId, ReplicatedEntity>,
    despawned: HashSet<EntityId>,
}

impl ReplicaView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds any server message into the view. Messages that carry no
    /// entity data (authentication responses) report `Unknown`.
    pub fn apply(&mut self, msg: &ServerMessage) -> ApplyOutcome {
        match msg {
            ServerMessage::EntitySpawned(snapshot) => self.apply_snapshot(snapshot.clone()),
            ServerMessage::StateUpdate(update) => self.apply_update(update),
            ServerMessage::EntityDespawned { entity_id } => {
                self.despawned.insert(*entity_id);
                match self.entities.remove(entity_id) {
                    Some(_) => ApplyOutcome::Applied,
                    None => ApplyOutcome::Unknown,
                }
            }
            ServerMessage::AuthenticationResponse { .. } => ApplyOutcome::Unknown,
        }
    }

    /// Inserts or refreshes an entity from a spawn snapshot.
    ///
    /// A snapshot older than what the view already holds keeps the newer
    /// state and position.
    pub fn apply_snapshot(&mut self, snapshot: EntitySnapshot) -> ApplyOutcome {
        if self.despawned.contains(&snapshot.entity_id) {
            return ApplyOutcome::Unknown;
        }
        match self.entities.get_mut(&snapshot.entity_id) {
            Some(existing) if snapshot.revision <= existing.snapshot.revision => {
                ApplyOutcome::Stale
            }
            Some(existing) => {
                existing.snapshot = snapshot;
                ApplyOutcome::Applied
            }
            None => {
                self.entities.insert(
                    snapshot.entity_id,
                    ReplicatedEntity { snapshot, tick: 0 },
                );
                ApplyOutcome::Applied
            }
        }
    }

    /// Applies one state update if it is newer than the last applied.
    pub fn apply_update(&mut self, update: &StateUpdate) -> ApplyOutcome {
        let Some(entity) = self.entities.get_mut(&update.entity_id) else {
            tracing::trace!(entity_id = %update.entity_id, "update for unknown entity");
            return ApplyOutcome::Unknown;
        };
        if update.revision <= entity.snapshot.revision {
            return ApplyOutcome::Stale;
        }
        entity.snapshot.revision = update.revision;
        entity.snapshot.state = update.state;
        entity.snapshot.position = update.position;
        entity.tick = update.tick;
        ApplyOutcome::Applied
    }

    pub fn get(&self, entity_id: EntityId) -> Option<&ReplicatedEntity> {
        self.entities.get(&entity_id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReplicatedEntity> {
        self.entities.values()
    }
}
