//! Character records and the owner cross-check policy.

use std::fmt;

use realmgate_protocol::{CharacterId, Vec3};
use serde::{Deserialize, Serialize};

use crate::VerificationError;

/// Identity-service account id (the `userId` a token resolves to).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A-{}", self.0)
    }
}

/// A verified character, ready to be turned into an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterRecord {
    pub id: CharacterId,
    /// Owning account, when the identity service reports it.
    pub owner: Option<AccountId>,
    pub name: String,
    pub race: String,
    pub character_class: String,
    /// Last saved position. The origin means "never saved".
    pub position: Vec3,
}

/// How the character's owning account is compared with the account the
/// token resolved to.
///
/// The identity service's `GET /characters/{id}` already scopes the
/// lookup to the bearer token's account, so a record that comes back is
/// normally the caller's. The record itself usually carries no owner id,
/// which is why the default accepts records without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OwnerCheck {
    /// The record must carry an owner id equal to the token's account.
    Strict,
    /// Reject a record whose owner id differs; accept one without an
    /// owner id.
    #[default]
    WhenPresent,
    /// Never compare owners.
    Disabled,
}

impl OwnerCheck {
    /// Applies the policy to a fetched record.
    pub fn check(
        self,
        token_account: AccountId,
        record: &CharacterRecord,
    ) -> Result<(), VerificationError> {
        let mismatch = || VerificationError::OwnerMismatch {
            expected: token_account,
            actual: record.owner,
        };
        match (self, record.owner) {
            (Self::Disabled, _) => Ok(()),
            (Self::Strict, None) => Err(mismatch()),
            (_, Some(owner)) if owner != token_account => Err(mismatch()),
            _ => Ok(()),
        }
    }
}

impl std::str::FromStr for OwnerCheck {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "when-present" | "when_present" => Ok(Self::WhenPresent),
            "disabled" | "off" => Ok(Self::Disabled),
            other => Err(format!("unknown owner check policy '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire payloads of the identity service
// ---------------------------------------------------------------------------

/// Body of `POST /auth/validate`.
#[derive(Debug, Serialize)]
pub(crate) struct ValidateTokenRequest<'a> {
    #[serde(rename = "Token")]
    pub(crate) token: &'a str,
}

/// Response of `POST /auth/validate`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ValidateTokenResponse {
    pub(crate) valid: bool,
    #[serde(default)]
    pub(crate) user_id: Option<i64>,
}

/// Response of `GET /characters/{id}`.
///
/// The service serializes the class column as `class`; older builds sent
/// `characterClass`. Both are accepted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CharacterPayload {
    pub(crate) id: i64,
    #[serde(default)]
    pub(crate) user_id: Option<i64>,
    pub(crate) name: String,
    pub(crate) race: String,
    #[serde(alias = "class")]
    pub(crate) character_class: String,
    #[serde(default)]
    pub(crate) position_x: f32,
    #[serde(default)]
    pub(crate) position_y: f32,
    #[serde(default)]
    pub(crate) position_z: f32,
}

impl From<CharacterPayload> for CharacterRecord {
    fn from(p: CharacterPayload) -> Self {
        Self {
            id: CharacterId(p.id),
            owner: p.user_id.map(AccountId),
            name: p.name,
            race: p.race,
            character_class: p.character_class,
            position: Vec3::new(p.position_x, p.position_y, p.position_z),
        }
    }
}
