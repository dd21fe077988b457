//! The connection gatekeeper: the only writer of connection admission
//! state.
//!
//! Every accepted connection starts `Unauthenticated` with an admission
//! deadline. It may send one handshake, which moves it to
//! `Authenticating` while the identity service is consulted. The loop
//! then either binds it to an entity or rejects it.
//!
//! ```text
//! accept() ──→ Unauthenticated ──(begin_handshake)──→ Authenticating
//!                    │                                    │      │
//!                    │                             bind() │      │ reject()
//!                    ▼                                    ▼      ▼
//!            expire_admissions() ──────────────→ Closed   Bound  Closed
//!
//! disconnect() removes the connection from any state.
//! ```
//!
//! The gatekeeper is plain data owned by the authority loop. It never
//! spawns, sleeps, or touches the transport; time comes in as `now`
//! arguments, and cancellation is done through the `AbortHandle` the loop
//! attached to the attempt.

use std::collections::BTreeMap;
use std::time::Duration;

use realmgate_protocol::{CharacterId, EntityId};
use realmgate_transport::ConnectionId;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::{AttemptId, GateError, HandshakeAttempt, HandshakeTicket, SessionConfig};

/// Admission state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, no handshake yet.
    Unauthenticated,
    /// A handshake is being verified.
    Authenticating,
    /// Owns exactly one entity.
    Bound,
    /// Rejected or timed out; waiting for the transport to close.
    Closed,
}

#[derive(Debug)]
struct Admission {
    state: ConnectionState,
    /// Pending admission deadline. Removed on bind, which cancels the
    /// timer.
    deadline: Option<Instant>,
    attempt: Option<HandshakeAttempt>,
}

/// Tracks every connection from accept to disconnect.
#[derive(Debug)]
pub struct Gatekeeper {
    config: SessionConfig,
    connections: BTreeMap<ConnectionId, Admission>,
    /// The explicit `connection → entity` table. An entry exists exactly
    /// while the connection is `Bound`.
    bindings: BTreeMap<ConnectionId, EntityId>,
    next_attempt: u64,
}

impl Gatekeeper {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            connections: BTreeMap::new(),
            bindings: BTreeMap::new(),
            next_attempt: 1,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Starts tracking a freshly accepted connection and arms its
    /// admission deadline at `now + admission_timeout`.
    pub fn accept(&mut self, connection_id: ConnectionId, now: Instant) -> Result<(), GateError> {
        if self.connections.contains_key(&connection_id) {
            return Err(GateError::AlreadyTracked(connection_id));
        }
        let deadline = now + self.config.admission_timeout;
        self.connections.insert(
            connection_id,
            Admission {
                state: ConnectionState::Unauthenticated,
                deadline: Some(deadline),
                attempt: None,
            },
        );
        tracing::debug!(%connection_id, "connection admitted, awaiting handshake");
        Ok(())
    }

    /// Records a handshake request and moves the connection to
    /// `Authenticating`.
    ///
    /// Only an `Unauthenticated` connection may begin a handshake. The
    /// returned ticket carries what the loop needs to spawn the
    /// verification task.
    pub fn begin_handshake(
        &mut self,
        connection_id: ConnectionId,
        token: String,
        character_id: CharacterId,
    ) -> Result<HandshakeTicket, GateError> {
        let admission = self
            .connections
            .get_mut(&connection_id)
            .ok_or(GateError::NotFound(connection_id))?;

        match admission.state {
            ConnectionState::Unauthenticated => {}
            ConnectionState::Authenticating => {
                return Err(GateError::HandshakeInFlight(connection_id));
            }
            ConnectionState::Bound => return Err(GateError::AlreadyBound(connection_id)),
            ConnectionState::Closed => return Err(GateError::Closed(connection_id)),
        }

        let Some(deadline) = admission.deadline else {
            return Err(GateError::Closed(connection_id));
        };

        let attempt_id = AttemptId(self.next_attempt);
        self.next_attempt += 1;

        admission.state = ConnectionState::Authenticating;
        admission.attempt = Some(HandshakeAttempt {
            attempt_id,
            connection_id,
            token: token.clone(),
            character_id,
            deadline,
            task: None,
        });

        tracing::debug!(%connection_id, %attempt_id, %character_id, "handshake started");

        Ok(HandshakeTicket {
            connection_id,
            attempt_id,
            token,
            character_id,
        })
    }

    /// Attaches the verification task's abort handle to the live attempt.
    ///
    /// If the attempt is no longer live (the connection left in between),
    /// the task is aborted right away and `StaleAttempt` is returned.
    pub fn attach_task(
        &mut self,
        connection_id: ConnectionId,
        attempt_id: AttemptId,
        task: AbortHandle,
    ) -> Result<(), GateError> {
        let live = self
            .connections
            .get_mut(&connection_id)
            .and_then(|a| a.attempt.as_mut())
            .filter(|attempt| attempt.attempt_id == attempt_id);

        match live {
            Some(attempt) => {
                attempt.task = Some(task);
                Ok(())
            }
            None => {
                task.abort();
                Err(GateError::StaleAttempt {
                    connection_id,
                    attempt_id,
                })
            }
        }
    }

    /// Consumes the live attempt once its verification result arrives.
    ///
    /// The connection stays `Authenticating`; the caller follows up with
    /// [`bind`](Self::bind) or [`reject`](Self::reject). A result for an
    /// attempt that is not the live one is `StaleAttempt` and must be
    /// discarded.
    pub fn complete_handshake(
        &mut self,
        connection_id: ConnectionId,
        attempt_id: AttemptId,
    ) -> Result<HandshakeAttempt, GateError> {
        let admission = self
            .connections
            .get_mut(&connection_id)
            .ok_or(GateError::NotFound(connection_id))?;

        match admission.attempt.take() {
            Some(mut attempt) if attempt.attempt_id == attempt_id => {
                // The task has finished; dropping its handle is enough.
                attempt.task = None;
                Ok(attempt)
            }
            other => {
                admission.attempt = other;
                Err(GateError::StaleAttempt {
                    connection_id,
                    attempt_id,
                })
            }
        }
    }

    /// Binds an authenticating connection to its entity, cancelling the
    /// admission timer.
    pub fn bind(&mut self, connection_id: ConnectionId, entity_id: EntityId) -> Result<(), GateError> {
        let admission = self
            .connections
            .get_mut(&connection_id)
            .ok_or(GateError::NotFound(connection_id))?;

        match admission.state {
            ConnectionState::Authenticating if admission.attempt.is_none() => {}
            ConnectionState::Authenticating => {
                return Err(GateError::HandshakeInFlight(connection_id));
            }
            ConnectionState::Bound => return Err(GateError::AlreadyBound(connection_id)),
            ConnectionState::Closed => return Err(GateError::Closed(connection_id)),
            ConnectionState::Unauthenticated => {
                return Err(GateError::NotAuthenticating(connection_id));
            }
        }

        admission.state = ConnectionState::Bound;
        admission.deadline = None;
        self.bindings.insert(connection_id, entity_id);

        tracing::info!(%connection_id, %entity_id, "connection bound");
        Ok(())
    }

    /// Marks a connection as rejected. It stays tracked (ignoring further
    /// messages) until the transport closes.
    ///
    /// Returns the grace period the caller must wait, after writing the
    /// rejection, before closing the transport.
    pub fn reject(&mut self, connection_id: ConnectionId) -> Result<Duration, GateError> {
        let admission = self
            .connections
            .get_mut(&connection_id)
            .ok_or(GateError::NotFound(connection_id))?;

        match admission.state {
            ConnectionState::Bound => return Err(GateError::AlreadyBound(connection_id)),
            ConnectionState::Closed => return Err(GateError::Closed(connection_id)),
            ConnectionState::Unauthenticated | ConnectionState::Authenticating => {}
        }

        if let Some(mut attempt) = admission.attempt.take() {
            attempt.cancel();
        }
        admission.state = ConnectionState::Closed;
        admission.deadline = None;

        tracing::info!(%connection_id, "connection rejected");
        Ok(self.config.rejection_grace)
    }

    /// Closes every connection whose admission deadline is at or before
    /// `now` and aborts its outstanding verification.
    ///
    /// Returns the expired connections in ascending id order; the caller
    /// closes their transports without sending anything.
    pub fn expire_admissions(&mut self, now: Instant) -> Vec<ConnectionId> {
        let mut expired = Vec::new();

        for (&connection_id, admission) in self.connections.iter_mut() {
            let Some(deadline) = admission.deadline else {
                continue;
            };
            if deadline > now {
                continue;
            }
            if let Some(mut attempt) = admission.attempt.take() {
                attempt.cancel();
            }
            admission.state = ConnectionState::Closed;
            admission.deadline = None;
            expired.push(connection_id);
            tracing::info!(%connection_id, "admission timed out");
        }

        expired
    }

    /// Forgets a connection whose transport closed.
    ///
    /// Aborts any outstanding verification and returns the entity the
    /// connection owned, which the caller must remove.
    pub fn disconnect(&mut self, connection_id: ConnectionId) -> Option<EntityId> {
        let mut admission = self.connections.remove(&connection_id)?;
        if let Some(attempt) = admission.attempt.as_mut() {
            attempt.cancel();
        }
        let entity = self.bindings.remove(&connection_id);
        tracing::debug!(%connection_id, ?entity, state = ?admission.state, "connection forgotten");
        entity
    }

    pub fn state(&self, connection_id: ConnectionId) -> Option<ConnectionState> {
        self.connections.get(&connection_id).map(|a| a.state)
    }

    /// The entity owned by a bound connection.
    pub fn entity_of(&self, connection_id: ConnectionId) -> Option<EntityId> {
        self.bindings.get(&connection_id).copied()
    }

    /// The live attempt of an authenticating connection.
    pub fn attempt(&self, connection_id: ConnectionId) -> Option<&HandshakeAttempt> {
        self.connections
            .get(&connection_id)
            .and_then(|a| a.attempt.as_ref())
    }

    /// Pending admission deadline, if the connection is not yet bound or
    /// closed.
    pub fn deadline(&self, connection_id: ConnectionId) -> Option<Instant> {
        self.connections.get(&connection_id).and_then(|a| a.deadline)
    }

    /// Every bound connection with its entity, in ascending connection id
    /// order.
    pub fn bound_connections(&self) -> impl Iterator<Item = (ConnectionId, EntityId)> + '_ {
        self.bindings.iter().map(|(&c, &e)| (c, e))
    }

    /// Number of tracked connections in any state.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for the gatekeeper state machine. Time is passed in
    //! explicitly, so none of these need a runtime except the ones that
    //! spawn a task to get a real `AbortHandle`.

    use super::*;

    // -- Helpers ----------------------------------------------------------

    fn gate() -> Gatekeeper {
        Gatekeeper::new(SessionConfig::default())
    }

    fn conn(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    /// Accepts `c` and begins a handshake for it.
    fn authenticating(gate: &mut Gatekeeper, c: ConnectionId, now: Instant) -> HandshakeTicket {
        gate.accept(c, now).unwrap();
        gate.begin_handshake(c, "jwt".into(), CharacterId(7)).unwrap()
    }

    // =====================================================================
    // accept()
    // =====================================================================

    #[test]
    fn test_accept_new_connection_is_unauthenticated_with_deadline() {
        let mut gate = gate();
        let now = Instant::now();

        gate.accept(conn(1), now).unwrap();

        assert_eq!(gate.state(conn(1)), Some(ConnectionState::Unauthenticated));
        assert_eq!(gate.deadline(conn(1)), Some(now + Duration::from_secs(30)));
        assert_eq!(gate.entity_of(conn(1)), None);
    }

    #[test]
    fn test_accept_twice_returns_already_tracked() {
        let mut gate = gate();
        let now = Instant::now();
        gate.accept(conn(1), now).unwrap();

        assert_eq!(gate.accept(conn(1), now), Err(GateError::AlreadyTracked(conn(1))));
    }

    // =====================================================================
    // begin_handshake()
    // =====================================================================

    #[test]
    fn test_begin_handshake_moves_to_authenticating() {
        let mut gate = gate();
        let ticket = authenticating(&mut gate, conn(1), Instant::now());

        assert_eq!(gate.state(conn(1)), Some(ConnectionState::Authenticating));
        assert_eq!(ticket.character_id, CharacterId(7));
        assert_eq!(ticket.token, "jwt");
        let attempt = gate.attempt(conn(1)).unwrap();
        assert_eq!(attempt.attempt_id, ticket.attempt_id);
        assert_eq!(attempt.deadline, gate.deadline(conn(1)).unwrap());
    }

    #[test]
    fn test_begin_handshake_while_in_flight_is_refused() {
        // At most one live attempt per connection.
        let mut gate = gate();
        let first = authenticating(&mut gate, conn(1), Instant::now());

        let second = gate.begin_handshake(conn(1), "other".into(), CharacterId(8));

        assert_eq!(second.unwrap_err(), GateError::HandshakeInFlight(conn(1)));
        assert_eq!(gate.attempt(conn(1)).unwrap().attempt_id, first.attempt_id);
    }

    #[test]
    fn test_begin_handshake_unknown_connection_not_found() {
        let mut gate = gate();
        let result = gate.begin_handshake(conn(9), "jwt".into(), CharacterId(7));
        assert_eq!(result.unwrap_err(), GateError::NotFound(conn(9)));
    }

    #[test]
    fn test_begin_handshake_attempt_ids_are_unique() {
        let mut gate = gate();
        let now = Instant::now();
        let a = authenticating(&mut gate, conn(1), now);
        let b = authenticating(&mut gate, conn(2), now);
        assert_ne!(a.attempt_id, b.attempt_id);
    }

    // =====================================================================
    // complete_handshake() / bind()
    // =====================================================================

    #[test]
    fn test_bind_after_complete_cancels_deadline_and_records_entity() {
        let mut gate = gate();
        let ticket = authenticating(&mut gate, conn(1), Instant::now());

        let attempt = gate.complete_handshake(conn(1), ticket.attempt_id).unwrap();
        assert_eq!(attempt.character_id, CharacterId(7));
        gate.bind(conn(1), EntityId(5)).unwrap();

        assert_eq!(gate.state(conn(1)), Some(ConnectionState::Bound));
        assert_eq!(gate.entity_of(conn(1)), Some(EntityId(5)));
        assert_eq!(gate.deadline(conn(1)), None);
        assert!(gate.attempt(conn(1)).is_none());
    }

    #[test]
    fn test_complete_handshake_wrong_attempt_is_stale() {
        let mut gate = gate();
        let ticket = authenticating(&mut gate, conn(1), Instant::now());
        let wrong = AttemptId(ticket.attempt_id.0 + 100);

        let result = gate.complete_handshake(conn(1), wrong);

        assert!(matches!(result, Err(GateError::StaleAttempt { .. })));
        assert!(gate.attempt(conn(1)).is_some(), "live attempt untouched");
    }

    #[test]
    fn test_complete_handshake_after_disconnect_not_found() {
        let mut gate = gate();
        let ticket = authenticating(&mut gate, conn(1), Instant::now());
        gate.disconnect(conn(1));

        let result = gate.complete_handshake(conn(1), ticket.attempt_id);
        assert!(matches!(result, Err(GateError::NotFound(_))));
    }

    #[test]
    fn test_bind_without_handshake_is_refused() {
        let mut gate = gate();
        gate.accept(conn(1), Instant::now()).unwrap();

        assert_eq!(
            gate.bind(conn(1), EntityId(1)),
            Err(GateError::NotAuthenticating(conn(1)))
        );
        assert_eq!(gate.entity_of(conn(1)), None);
    }

    #[test]
    fn test_bind_before_complete_is_refused() {
        let mut gate = gate();
        authenticating(&mut gate, conn(1), Instant::now());

        assert_eq!(
            gate.bind(conn(1), EntityId(1)),
            Err(GateError::HandshakeInFlight(conn(1)))
        );
    }

    #[test]
    fn test_begin_handshake_after_bind_is_refused() {
        let mut gate = gate();
        let ticket = authenticating(&mut gate, conn(1), Instant::now());
        gate.complete_handshake(conn(1), ticket.attempt_id).unwrap();
        gate.bind(conn(1), EntityId(1)).unwrap();

        let result = gate.begin_handshake(conn(1), "jwt".into(), CharacterId(7));
        assert_eq!(result.unwrap_err(), GateError::AlreadyBound(conn(1)));
    }

    // =====================================================================
    // reject()
    // =====================================================================

    #[test]
    fn test_reject_closes_and_returns_grace() {
        let mut gate = gate();
        let ticket = authenticating(&mut gate, conn(1), Instant::now());
        gate.complete_handshake(conn(1), ticket.attempt_id).unwrap();

        let grace = gate.reject(conn(1)).unwrap();

        assert_eq!(grace, Duration::from_secs(1));
        assert_eq!(gate.state(conn(1)), Some(ConnectionState::Closed));
        assert_eq!(gate.deadline(conn(1)), None);
        assert_eq!(gate.entity_of(conn(1)), None);
    }

    #[test]
    fn test_reject_bound_connection_is_refused() {
        let mut gate = gate();
        let ticket = authenticating(&mut gate, conn(1), Instant::now());
        gate.complete_handshake(conn(1), ticket.attempt_id).unwrap();
        gate.bind(conn(1), EntityId(1)).unwrap();

        assert_eq!(gate.reject(conn(1)), Err(GateError::AlreadyBound(conn(1))));
    }

    // =====================================================================
    // expire_admissions()
    // =====================================================================

    #[test]
    fn test_expire_admissions_before_deadline_keeps_connection() {
        let mut gate = gate();
        let now = Instant::now();
        gate.accept(conn(1), now).unwrap();

        let expired = gate.expire_admissions(now + Duration::from_secs(29));

        assert!(expired.is_empty());
        assert_eq!(gate.state(conn(1)), Some(ConnectionState::Unauthenticated));
    }

    #[test]
    fn test_expire_admissions_at_deadline_closes_unbound_only() {
        let mut gate = gate();
        let now = Instant::now();
        gate.accept(conn(1), now).unwrap();
        authenticating(&mut gate, conn(2), now);
        let ticket = authenticating(&mut gate, conn(3), now);
        gate.complete_handshake(conn(3), ticket.attempt_id).unwrap();
        gate.bind(conn(3), EntityId(1)).unwrap();

        let expired = gate.expire_admissions(now + Duration::from_secs(30));

        assert_eq!(expired, vec![conn(1), conn(2)]);
        assert_eq!(gate.state(conn(1)), Some(ConnectionState::Closed));
        assert_eq!(gate.state(conn(2)), Some(ConnectionState::Closed));
        assert!(gate.attempt(conn(2)).is_none());
        assert_eq!(gate.state(conn(3)), Some(ConnectionState::Bound));
    }

    #[test]
    fn test_expire_admissions_reports_each_connection_once() {
        let mut gate = gate();
        let now = Instant::now();
        gate.accept(conn(1), now).unwrap();

        let later = now + Duration::from_secs(31);
        assert_eq!(gate.expire_admissions(later), vec![conn(1)]);
        assert!(gate.expire_admissions(later).is_empty());
    }

    // =====================================================================
    // disconnect() / bindings
    // =====================================================================

    #[test]
    fn test_disconnect_bound_returns_entity_and_forgets() {
        let mut gate = gate();
        let ticket = authenticating(&mut gate, conn(1), Instant::now());
        gate.complete_handshake(conn(1), ticket.attempt_id).unwrap();
        gate.bind(conn(1), EntityId(4)).unwrap();

        assert_eq!(gate.disconnect(conn(1)), Some(EntityId(4)));
        assert_eq!(gate.state(conn(1)), None);
        assert_eq!(gate.entity_of(conn(1)), None);
        assert!(gate.is_empty());
    }

    #[test]
    fn test_disconnect_unknown_returns_none() {
        let mut gate = gate();
        assert_eq!(gate.disconnect(conn(1)), None);
    }

    #[test]
    fn test_entity_exists_only_for_bound_connections() {
        // Drive several connections through every state and check that the
        // binding table never names a connection that is not Bound.
        let mut gate = gate();
        let now = Instant::now();
        gate.accept(conn(1), now).unwrap();
        let t2 = authenticating(&mut gate, conn(2), now);
        let t3 = authenticating(&mut gate, conn(3), now);
        gate.complete_handshake(conn(2), t2.attempt_id).unwrap();
        gate.bind(conn(2), EntityId(20)).unwrap();
        gate.complete_handshake(conn(3), t3.attempt_id).unwrap();
        gate.reject(conn(3)).unwrap();

        for (c, _) in gate.bound_connections() {
            assert_eq!(gate.state(c), Some(ConnectionState::Bound));
        }
        let bound: Vec<_> = gate.bound_connections().collect();
        assert_eq!(bound, vec![(conn(2), EntityId(20))]);
    }

    // =====================================================================
    // Task cancellation
    // =====================================================================

    #[tokio::test]
    async fn test_disconnect_aborts_verification_task() {
        let mut gate = gate();
        let ticket = authenticating(&mut gate, conn(1), Instant::now());
        let task = tokio::spawn(std::future::pending::<()>());
        gate.attach_task(conn(1), ticket.attempt_id, task.abort_handle())
            .unwrap();

        gate.disconnect(conn(1));

        let err = task.await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_expire_admissions_aborts_verification_task() {
        let mut gate = gate();
        let now = Instant::now();
        let ticket = authenticating(&mut gate, conn(1), now);
        let task = tokio::spawn(std::future::pending::<()>());
        gate.attach_task(conn(1), ticket.attempt_id, task.abort_handle())
            .unwrap();

        gate.expire_admissions(now + Duration::from_secs(30));

        assert!(task.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_attach_task_to_stale_attempt_aborts_it() {
        let mut gate = gate();
        let ticket = authenticating(&mut gate, conn(1), Instant::now());
        gate.disconnect(conn(1));
        let task = tokio::spawn(std::future::pending::<()>());

        let result = gate.attach_task(conn(1), ticket.attempt_id, task.abort_handle());

        assert!(matches!(result, Err(GateError::StaleAttempt { .. })));
        assert!(task.await.unwrap_err().is_cancelled());
    }
}
