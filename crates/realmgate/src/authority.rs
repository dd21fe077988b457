//! The authoritative loop.
//!
//! One task owns the [`Gatekeeper`], the [`MovementAuthority`] and the
//! tick scheduler. Connection tasks never touch that state: they post
//! [`LoopEvent`]s in and drain an ordered per-connection [`Outbound`]
//! queue. Verification runs in its own task and posts its result back,
//! so a slow identity service never stalls the simulation.
//!
//! ```text
//!  conn tasks ──LoopEvent──→ ┌───────────────┐ ──Outbound──→ conn tasks
//!                            │ AuthorityLoop │
//!  verify tasks ──outcome──→ │  gate, world  │ ←── tick (30 Hz)
//!                            └───────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use realmgate_identity::{CharacterRecord, IdentityVerifier, VerificationError};
use realmgate_protocol::{CharacterId, ClientMessage, ServerMessage, Vec3};
use realmgate_session::{AttemptId, GateError, Gatekeeper, HandshakeTicket};
use realmgate_tick::{TickInfo, TickScheduler};
use realmgate_transport::ConnectionId;
use realmgate_world::{MovementAuthority, NavigableSurface};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::{ServerConfig, SessionSpawner};

/// Capacity of the loop's inbound event queue.
pub(crate) const EVENT_QUEUE_CAPACITY: usize = 1024;

/// How far a connection's writer may fall behind before the connection
/// is dropped. Holds a full join burst (one snapshot per entity) on a
/// crowded server.
pub(crate) const OUTBOUND_QUEUE_CAPACITY: usize = 1024;

/// Something a connection task reports to the loop.
#[derive(Debug)]
pub(crate) enum LoopEvent {
    /// A transport connection was accepted.
    Connected {
        connection_id: ConnectionId,
        outbound: OutboundQueue,
    },
    /// A decoded client message.
    Message {
        connection_id: ConnectionId,
        message: ClientMessage,
    },
    /// The transport closed.
    Disconnected { connection_id: ConnectionId },
}

/// Something the loop asks a connection task to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Outbound {
    Message(ServerMessage),
    /// Close the transport once `after` has elapsed since everything
    /// queued before it was written.
    Close { after: Duration },
}

/// The loop's handle on one connection's writer task.
#[derive(Debug)]
pub(crate) struct OutboundQueue {
    tx: mpsc::Sender<Outbound>,
    writer: AbortHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Push {
    Queued,
    /// The writer is gone; the disconnect is already on its way.
    Closed,
    /// The writer fell `OUTBOUND_QUEUE_CAPACITY` items behind and was
    /// aborted.
    Overflowed,
}

impl OutboundQueue {
    pub(crate) fn new(tx: mpsc::Sender<Outbound>, writer: AbortHandle) -> Self {
        Self { tx, writer }
    }

    fn push(&self, item: Outbound) -> Push {
        match self.tx.try_send(item) {
            Ok(()) => Push::Queued,
            Err(TrySendError::Closed(_)) => Push::Closed,
            Err(TrySendError::Full(_)) => {
                // Ending the writer ends the reader too, which reports
                // the disconnect.
                self.writer.abort();
                Push::Overflowed
            }
        }
    }
}

/// Result of one verification task.
#[derive(Debug)]
pub(crate) struct VerificationOutcome {
    connection_id: ConnectionId,
    attempt_id: AttemptId,
    result: Result<CharacterRecord, VerificationError>,
}

pub(crate) struct AuthorityLoop<V: IdentityVerifier> {
    gate: Gatekeeper,
    world: MovementAuthority,
    spawner: SessionSpawner,
    verifier: Arc<V>,
    scheduler: TickScheduler,
    outbound: HashMap<ConnectionId, OutboundQueue>,
    events: mpsc::Receiver<LoopEvent>,
    results_tx: mpsc::UnboundedSender<VerificationOutcome>,
    results_rx: mpsc::UnboundedReceiver<VerificationOutcome>,
}

impl<V: IdentityVerifier> AuthorityLoop<V> {
    pub(crate) fn new(
        config: &ServerConfig,
        surface: impl NavigableSurface,
        verifier: Arc<V>,
        events: mpsc::Receiver<LoopEvent>,
    ) -> Self {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        Self {
            gate: Gatekeeper::new(config.session.clone()),
            world: MovementAuthority::new(config.movement.clone(), surface),
            spawner: SessionSpawner::new(config.default_spawn),
            verifier,
            scheduler: TickScheduler::new(config.tick.clone()),
            outbound: HashMap::new(),
            events,
            results_tx,
            results_rx,
        }
    }

    /// Runs until every event sender is gone.
    pub(crate) async fn run(mut self) {
        tracing::info!(
            tick_rate_hz = self.scheduler.tick_rate_hz(),
            "authority loop running"
        );

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.on_event(event),
                    None => break,
                },
                Some(outcome) = self.results_rx.recv() => self.on_verification(outcome),
                info = self.scheduler.wait_for_tick() => self.on_tick(info),
            }
        }

        tracing::info!(ticks = self.scheduler.tick_count(), "authority loop stopped");
    }

    // -----------------------------------------------------------------
    // Connection events
    // -----------------------------------------------------------------

    fn on_event(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::Connected {
                connection_id,
                outbound,
            } => {
                if let Err(e) = self.gate.accept(connection_id, Instant::now()) {
                    tracing::warn!(%connection_id, error = %e, "duplicate connection id");
                    return;
                }
                self.outbound.insert(connection_id, outbound);
            }
            LoopEvent::Message {
                connection_id,
                message,
            } => self.on_message(connection_id, message),
            LoopEvent::Disconnected { connection_id } => self.on_disconnect(connection_id),
        }
    }

    fn on_message(&mut self, connection_id: ConnectionId, message: ClientMessage) {
        tracing::trace!(%connection_id, kind = message.kind(), "client message");
        match message {
            ClientMessage::AuthenticationRequest {
                token,
                character_id,
            } => self.on_authentication_request(connection_id, token, character_id),
            ClientMessage::MoveRequest { target_position } => {
                self.on_move_request(connection_id, target_position)
            }
        }
    }

    fn on_authentication_request(
        &mut self,
        connection_id: ConnectionId,
        token: String,
        character_id: CharacterId,
    ) {
        let ticket = match self.gate.begin_handshake(connection_id, token, character_id) {
            Ok(ticket) => ticket,
            Err(e) => {
                // Only the first request on a connection is honored.
                tracing::debug!(%connection_id, error = %e, "authentication request ignored");
                return;
            }
        };

        let HandshakeTicket {
            connection_id,
            attempt_id,
            token,
            character_id,
        } = ticket;
        let verifier = Arc::clone(&self.verifier);
        let results = self.results_tx.clone();

        let task = tokio::spawn(async move {
            let result = verifier.verify(&token, character_id).await;
            let _ = results.send(VerificationOutcome {
                connection_id,
                attempt_id,
                result,
            });
        });

        if let Err(e) = self
            .gate
            .attach_task(connection_id, attempt_id, task.abort_handle())
        {
            tracing::debug!(%connection_id, error = %e, "verification task aborted");
        }
    }

    fn on_move_request(&mut self, connection_id: ConnectionId, target: Vec3) {
        let Some(entity_id) = self.gate.entity_of(connection_id) else {
            tracing::debug!(%connection_id, "move request from unbound connection ignored");
            return;
        };
        if let Err(e) = self.world.request_move(entity_id, target, connection_id) {
            tracing::debug!(%connection_id, %entity_id, error = %e, "move request dropped");
        }
    }

    fn on_disconnect(&mut self, connection_id: ConnectionId) {
        self.outbound.remove(&connection_id);
        let Some(entity_id) = self.gate.disconnect(connection_id) else {
            return;
        };
        if self.world.remove(entity_id).is_some() {
            self.broadcast(&ServerMessage::EntityDespawned { entity_id }, None);
        }
    }

    // -----------------------------------------------------------------
    // Verification results
    // -----------------------------------------------------------------

    fn on_verification(&mut self, outcome: VerificationOutcome) {
        let VerificationOutcome {
            connection_id,
            attempt_id,
            result,
        } = outcome;

        if let Err(e) = self.gate.complete_handshake(connection_id, attempt_id) {
            tracing::debug!(%connection_id, %attempt_id, error = %e, "verification result discarded");
            return;
        }

        match result {
            Ok(record) => self.admit(connection_id, record),
            Err(e) => self.refuse(connection_id, e),
        }
    }

    fn admit(&mut self, connection_id: ConnectionId, record: CharacterRecord) {
        let entity_id = self.spawner.spawn(&mut self.world, connection_id, &record);
        if let Err(e) = self.gate.bind(connection_id, entity_id) {
            tracing::warn!(%connection_id, %entity_id, error = %e, "bind failed, removing entity");
            self.world.remove(entity_id);
            return;
        }

        tracing::info!(
            %connection_id,
            %entity_id,
            character_id = %record.id,
            name = %record.name,
            "character entered the world"
        );

        self.send(
            connection_id,
            Outbound::Message(ServerMessage::accepted(
                entity_id,
                format!("welcome, {}", record.name),
            )),
        );
        for snapshot in self.world.snapshots() {
            self.send(
                connection_id,
                Outbound::Message(ServerMessage::EntitySpawned(snapshot)),
            );
        }
        if let Some(snapshot) = self.world.snapshot(entity_id) {
            self.broadcast(&ServerMessage::EntitySpawned(snapshot), Some(connection_id));
        }
    }

    fn refuse(&mut self, connection_id: ConnectionId, error: VerificationError) {
        tracing::warn!(%connection_id, %error, "verification failed");
        match self.gate.reject(connection_id) {
            Ok(grace) => {
                self.send(
                    connection_id,
                    Outbound::Message(ServerMessage::rejected(error.client_reason())),
                );
                self.send(connection_id, Outbound::Close { after: grace });
            }
            Err(e @ GateError::NotFound(_)) => {
                tracing::debug!(%connection_id, error = %e, "rejected connection already gone");
            }
            Err(e) => tracing::warn!(%connection_id, error = %e, "reject failed"),
        }
    }

    // -----------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------

    fn on_tick(&mut self, info: TickInfo) {
        for connection_id in self.gate.expire_admissions(Instant::now()) {
            self.send(connection_id, Outbound::Close { after: Duration::ZERO });
        }

        self.world.tick(info.dt_secs(), info.tick);
        self.flush_updates();

        self.scheduler.record_tick_end();
    }

    /// Sends every pending state change to every bound connection.
    fn flush_updates(&mut self) {
        let updates = self.world.drain_updates();
        if updates.is_empty() {
            return;
        }
        let bound: Vec<ConnectionId> = self.gate.bound_connections().map(|(c, _)| c).collect();
        for connection_id in bound {
            for update in &updates {
                self.send(
                    connection_id,
                    Outbound::Message(ServerMessage::StateUpdate(update.clone())),
                );
            }
        }
    }

    // -----------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------

    fn send(&mut self, connection_id: ConnectionId, outbound: Outbound) {
        let Some(queue) = self.outbound.get(&connection_id) else {
            return;
        };
        match queue.push(outbound) {
            Push::Queued => {}
            Push::Closed => tracing::debug!(%connection_id, "outbound queue closed"),
            Push::Overflowed => {
                tracing::warn!(
                    %connection_id,
                    capacity = OUTBOUND_QUEUE_CAPACITY,
                    "client not reading, dropping connection"
                );
                // Nothing more is queued; cleanup follows the disconnect.
                self.outbound.remove(&connection_id);
            }
        }
    }

    fn broadcast(&mut self, message: &ServerMessage, except: Option<ConnectionId>) {
        let targets: Vec<ConnectionId> = self
            .gate
            .bound_connections()
            .map(|(c, _)| c)
            .filter(|c| Some(*c) != except)
            .collect();
        for connection_id in targets {
            self.send(connection_id, Outbound::Message(message.clone()));
        }
    }
}
