//! Handshake attempts: one live verification per connection.

use std::fmt;

use realmgate_protocol::CharacterId;
use realmgate_transport::ConnectionId;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Process-unique id of one handshake attempt.
///
/// Lets the loop tell the result of the live attempt apart from a late
/// result of an attempt that was already cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttemptId(pub u64);

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt-{}", self.0)
    }
}

/// An in-flight handshake. Lives in memory only, from the request until
/// verification completes, the connection goes away, or the admission
/// deadline passes.
pub struct HandshakeAttempt {
    pub attempt_id: AttemptId,
    pub connection_id: ConnectionId,
    pub token: String,
    pub character_id: CharacterId,
    /// Admission deadline of the owning connection.
    pub deadline: Instant,
    /// Abort handle of the verification task, once spawned.
    pub(crate) task: Option<AbortHandle>,
}

impl HandshakeAttempt {
    /// Aborts the verification task if one is attached.
    pub(crate) fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn has_task(&self) -> bool {
        self.task.is_some()
    }
}

// Manual impl: the token must never reach a log line.
impl fmt::Debug for HandshakeAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeAttempt")
            .field("attempt_id", &self.attempt_id)
            .field("connection_id", &self.connection_id)
            .field("token", &"<redacted>")
            .field("character_id", &self.character_id)
            .field("deadline", &self.deadline)
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

/// What the loop needs to spawn the verification task for a freshly
/// begun attempt.
#[derive(Clone)]
pub struct HandshakeTicket {
    pub connection_id: ConnectionId,
    pub attempt_id: AttemptId,
    pub token: String,
    pub character_id: CharacterId,
}

impl fmt::Debug for HandshakeTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeTicket")
            .field("connection_id", &self.connection_id)
            .field("attempt_id", &self.attempt_id)
            .field("character_id", &self.character_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_never_prints_token() {
        let attempt = HandshakeAttempt {
            attempt_id: AttemptId(1),
            connection_id: ConnectionId::new(3),
            token: "super-secret-jwt".into(),
            character_id: CharacterId(7),
            deadline: Instant::now(),
            task: None,
        };
        let ticket = HandshakeTicket {
            connection_id: ConnectionId::new(3),
            attempt_id: AttemptId(1),
            token: "super-secret-jwt".into(),
            character_id: CharacterId(7),
        };

        assert!(!format!("{attempt:?}").contains("super-secret-jwt"));
        assert!(!format!("{ticket:?}").contains("super-secret-jwt"));
    }
}
