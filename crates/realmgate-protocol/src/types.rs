//! Core protocol types for Realmgate's wire format.
//!
//! Everything in this module travels "on the wire": it is serialized by
//! a [`Codec`](crate::Codec), sent over a transport connection, and
//! deserialized on the other side. Field names are camelCase on the wire
//! to match the game client.

use std::fmt;
use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Server-assigned identifier for an authoritative entity.
///
/// Newtype over `u64` so an entity id can never be passed where a
/// character id is expected. `#[serde(transparent)]` keeps it a plain
/// number on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E-{}", self.0)
    }
}

/// Identifier of a character record owned by the identity service.
///
/// Signed because it comes straight from the client and the identity
/// service's integer ids; non-positive values are rejected before any
/// lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterId(pub i64);

impl CharacterId {
    /// Returns `true` for ids the identity service can ever issue.
    pub fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Vec3
// ---------------------------------------------------------------------------

/// A point or direction in world space.
///
/// `f32` matches the precision the client renders with and the identity
/// service persists.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    /// The origin.
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    pub fn distance(self, other: Vec3) -> f32 {
        (other - self).length()
    }

    /// Unit vector in the same direction, or `None` for a zero-length
    /// vector.
    pub fn normalized(self) -> Option<Vec3> {
        let len = self.length();
        if len <= f32::EPSILON {
            None
        } else {
            Some(self * (1.0 / len))
        }
    }

    /// Exact comparison against the origin.
    pub fn is_zero(self) -> bool {
        self == Self::ZERO
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;

    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// MovementState
// ---------------------------------------------------------------------------

/// Replicated movement state of an entity.
///
/// ```text
///   Idle ──(valid destination)──→ Moving ──(arrival | no path)──→ Idle
///     │                              │
///     └───────────→ Dead ←───────────┘   (terminal for movement)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MovementState {
    #[default]
    Idle,
    Moving,
    Dead,
}

impl fmt::Display for MovementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Moving => write!(f, "Moving"),
            Self::Dead => write!(f, "Dead"),
        }
    }
}

// ---------------------------------------------------------------------------
// Replicated payloads
// ---------------------------------------------------------------------------

/// One replicated change of an entity's movement state or position.
///
/// `revision` increases strictly with every publish for the same entity;
/// observers use it to drop stale or duplicate deliveries. `tick` is the
/// simulation tick that produced the change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    pub entity_id: EntityId,
    pub tick: u64,
    pub revision: u64,
    pub state: MovementState,
    pub position: Vec3,
}

/// Everything an observer needs to start displaying an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshot {
    pub entity_id: EntityId,
    pub character_id: CharacterId,
    pub name: String,
    pub race: String,
    pub character_class: String,
    pub position: Vec3,
    pub state: MovementState,
    /// Revision of the last state update folded into this snapshot.
    pub revision: u64,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Messages a game client sends to the server.
///
/// Internally tagged: `{ "type": "MoveRequest", "targetPosition": {...} }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Claims a character with an identity-service token. Honored once
    /// per connection, before the connection is bound.
    AuthenticationRequest {
        token: String,
        character_id: CharacterId,
    },

    /// Asks the server to move the connection's own entity.
    MoveRequest { target_position: Vec3 },
}

impl ClientMessage {
    /// Short name for logging, without any payload (tokens stay out of
    /// logs).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthenticationRequest { .. } => "AuthenticationRequest",
            Self::MoveRequest { .. } => "MoveRequest",
        }
    }
}

/// Messages the server sends to a game client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Exactly one per accepted `AuthenticationRequest`. On success,
    /// `entity_id` names the entity the connection now controls.
    AuthenticationResponse {
        success: bool,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entity_id: Option<EntityId>,
    },

    /// A movement state transition or position change.
    StateUpdate(StateUpdate),

    /// An entity became visible (spawn, or snapshot on bind).
    EntitySpawned(EntitySnapshot),

    /// An entity was removed because its owner left.
    EntityDespawned { entity_id: EntityId },
}

impl ServerMessage {
    /// Success acknowledgement for a freshly bound connection.
    pub fn accepted(entity_id: EntityId, message: impl Into<String>) -> Self {
        Self::AuthenticationResponse {
            success: true,
            message: message.into(),
            entity_id: Some(entity_id),
        }
    }

    /// Rejection acknowledgement carrying a human-readable reason.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::AuthenticationResponse {
            success: false,
            message: message.into(),
            entity_id: None,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! These pin the JSON shapes the game client parses. A renamed field
    //! here is a broken client.

    use super::*;

    #[test]
    fn test_entity_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&EntityId(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn test_ids_display_with_prefix() {
        assert_eq!(EntityId(3).to_string(), "E-3");
        assert_eq!(CharacterId(7).to_string(), "C-7");
    }

    #[test]
    fn test_character_id_is_valid_rejects_non_positive() {
        assert!(CharacterId(1).is_valid());
        assert!(!CharacterId(0).is_valid());
        assert!(!CharacterId(-5).is_valid());
    }

    // =====================================================================
    // Vec3
    // =====================================================================

    #[test]
    fn test_vec3_distance_and_length() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 0.0, 4.0);
        assert_eq!(a.distance(b), 5.0);
        assert_eq!((b - a).length_squared(), 25.0);
    }

    #[test]
    fn test_vec3_normalized_zero_is_none() {
        assert!(Vec3::ZERO.normalized().is_none());
        let n = Vec3::new(0.0, 0.0, 2.0).normalized().unwrap();
        assert_eq!(n, Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_vec3_is_zero_only_for_exact_origin() {
        assert!(Vec3::ZERO.is_zero());
        assert!(!Vec3::new(0.0, 0.001, 0.0).is_zero());
    }

    // =====================================================================
    // ClientMessage
    // =====================================================================

    #[test]
    fn test_authentication_request_json_format() {
        let msg = ClientMessage::AuthenticationRequest {
            token: "jwt".into(),
            character_id: CharacterId(7),
        };
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "AuthenticationRequest");
        assert_eq!(json["token"], "jwt");
        assert_eq!(json["characterId"], 7);
    }

    #[test]
    fn test_move_request_parses_from_client_json() {
        let raw = r#"{"type":"MoveRequest","targetPosition":{"x":1.5,"y":0,"z":-2}}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(
            msg,
            ClientMessage::MoveRequest {
                target_position: Vec3::new(1.5, 0.0, -2.0)
            }
        );
        assert_eq!(msg.kind(), "MoveRequest");
    }

    #[test]
    fn test_unknown_client_message_type_returns_error() {
        let raw = r#"{"type":"FlyToMoon","speed":9000}"#;
        let result: Result<ClientMessage, _> = serde_json::from_str(raw);
        assert!(result.is_err());
    }

    // =====================================================================
    // ServerMessage
    // =====================================================================

    #[test]
    fn test_rejected_response_omits_entity_id() {
        let json = serde_json::to_value(ServerMessage::rejected("bad token")).unwrap();
        assert_eq!(json["type"], "AuthenticationResponse");
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "bad token");
        assert!(json.get("entityId").is_none());
    }

    #[test]
    fn test_accepted_response_carries_entity_id() {
        let json = serde_json::to_value(ServerMessage::accepted(EntityId(9), "ok")).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["entityId"], 9);
    }

    #[test]
    fn test_state_update_json_format() {
        let msg = ServerMessage::StateUpdate(StateUpdate {
            entity_id: EntityId(1),
            tick: 12,
            revision: 3,
            state: MovementState::Moving,
            position: Vec3::new(1.0, 2.0, 3.0),
        });
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "StateUpdate");
        assert_eq!(json["entityId"], 1);
        assert_eq!(json["tick"], 12);
        assert_eq!(json["revision"], 3);
        assert_eq!(json["state"], "Moving");
        assert_eq!(json["position"]["z"], 3.0);
    }

    #[test]
    fn test_entity_spawned_json_format() {
        let msg = ServerMessage::EntitySpawned(EntitySnapshot {
            entity_id: EntityId(2),
            character_id: CharacterId(7),
            name: "Eira".into(),
            race: "Elfo".into(),
            character_class: "Mago".into(),
            position: Vec3::new(10.0, 0.0, 10.0),
            state: MovementState::Idle,
            revision: 1,
        });
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "EntitySpawned");
        assert_eq!(json["characterId"], 7);
        assert_eq!(json["characterClass"], "Mago");
        assert_eq!(json["state"], "Idle");
    }

    #[test]
    fn test_entity_despawned_round_trip() {
        let msg = ServerMessage::EntityDespawned {
            entity_id: EntityId(4),
        };
        let bytes = serde_json::to_vec(&msg).unwrap();
        let decoded: ServerMessage = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }
}
