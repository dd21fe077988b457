//! Outgoing state replication.
//!
//! The replicator stamps every published change with the simulation tick
//! and a per-entity revision that only ever increases, then queues it
//! until the authority loop drains and broadcasts the batch. Observers
//! (see `realmgate_protocol::ReplicaView`) apply a change only if its
//! revision is newer than what they hold, so redelivery and reordering
//! can never roll an entity back.

use std::collections::HashMap;

use realmgate_protocol::{EntityId, MovementState, StateUpdate, Vec3};

#[derive(Debug, Default)]
pub struct StateReplicator {
    revisions: HashMap<EntityId, u64>,
    pending: Vec<StateUpdate>,
}

impl StateReplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking an entity at revision 0.
    pub fn register(&mut self, entity_id: EntityId) {
        self.revisions.entry(entity_id).or_insert(0);
    }

    /// Queues a change and returns it with its new revision.
    pub fn publish(
        &mut self,
        entity_id: EntityId,
        tick: u64,
        state: MovementState,
        position: Vec3,
    ) -> StateUpdate {
        let revision = self.revisions.entry(entity_id).or_insert(0);
        *revision += 1;
        let update = StateUpdate {
            entity_id,
            tick,
            revision: *revision,
            state,
            position,
        };
        tracing::trace!(%entity_id, tick, revision = update.revision, %state, "state published");
        self.pending.push(update.clone());
        update
    }

    /// Last revision published for an entity (0 if none yet).
    pub fn revision(&self, entity_id: EntityId) -> u64 {
        self.revisions.get(&entity_id).copied().unwrap_or(0)
    }

    /// Takes every queued change, in publish order.
    pub fn drain(&mut self) -> Vec<StateUpdate> {
        std::mem::take(&mut self.pending)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Stops tracking a removed entity and drops its queued changes.
    pub fn forget(&mut self, entity_id: EntityId) {
        self.revisions.remove(&entity_id);
        self.pending.retain(|u| u.entity_id != entity_id);
    }
}
