//! HTTP implementation of [`IdentityVerifier`] against the identity
//! service's REST API.

use std::time::Duration;

use realmgate_protocol::CharacterId;
use reqwest::{Client, StatusCode};

use crate::record::{CharacterPayload, ValidateTokenRequest, ValidateTokenResponse};
use crate::{AccountId, CharacterRecord, IdentityVerifier, OwnerCheck, VerificationError};

/// Settings for talking to the identity service.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Base URL the endpoint paths are appended to, e.g.
    /// `http://localhost:5000/api`.
    pub base_url: String,
    /// Upper bound for each HTTP call (validate and fetch separately).
    pub request_timeout: Duration,
    /// Owner cross-check applied after the character fetch.
    pub owner_check: OwnerCheck,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            request_timeout: Duration::from_secs(5),
            owner_check: OwnerCheck::default(),
        }
    }
}

/// Verifies handshakes by calling the identity service over HTTP.
///
/// Cheap to share: `reqwest::Client` pools connections internally, so one
/// instance serves every concurrent handshake.
#[derive(Debug, Clone)]
pub struct HttpIdentityClient {
    client: Client,
    config: IdentityConfig,
}

impl HttpIdentityClient {
    /// Builds a client with the configured per-request timeout.
    pub fn new(config: IdentityConfig) -> Result<Self, VerificationError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| VerificationError::Configuration(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Step 1: `POST /auth/validate` → the account the token belongs to.
    async fn validate_token(&self, token: &str) -> Result<AccountId, VerificationError> {
        let response = self
            .client
            .post(self.endpoint("auth/validate"))
            .json(&ValidateTokenRequest { token })
            .send()
            .await
            .map_err(|e| VerificationError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VerificationError::TokenRejected(format!("status {status}")));
        }

        let body: ValidateTokenResponse = response
            .json()
            .await
            .map_err(|e| VerificationError::MalformedResponse(e.to_string()))?;

        match (body.valid, body.user_id) {
            (true, Some(user_id)) => Ok(AccountId(user_id)),
            (true, None) => Err(VerificationError::MalformedResponse(
                "valid token without userId".into(),
            )),
            (false, _) => Err(VerificationError::TokenRejected("valid=false".into())),
        }
    }

    /// Step 2: `GET /characters/{id}` with the same bearer token.
    async fn fetch_character(
        &self,
        token: &str,
        character_id: CharacterId,
    ) -> Result<CharacterRecord, VerificationError> {
        let response = self
            .client
            .get(self.endpoint(&format!("characters/{}", character_id.0)))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| VerificationError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(VerificationError::CharacterUnavailable(format!(
                "{character_id} not found"
            )));
        }
        if !status.is_success() {
            return Err(VerificationError::CharacterUnavailable(format!("status {status}")));
        }

        let payload: CharacterPayload = response
            .json()
            .await
            .map_err(|e| VerificationError::MalformedResponse(e.to_string()))?;
        let record = CharacterRecord::from(payload);

        if record.id != character_id {
            return Err(VerificationError::MalformedResponse(format!(
                "asked for {character_id}, got {}",
                record.id
            )));
        }
        Ok(record)
    }
}

impl IdentityVerifier for HttpIdentityClient {
    async fn verify(
        &self,
        token: &str,
        character_id: CharacterId,
    ) -> Result<CharacterRecord, VerificationError> {
        if token.trim().is_empty() {
            return Err(VerificationError::InvalidRequest("empty token".into()));
        }
        if !character_id.is_valid() {
            return Err(VerificationError::InvalidRequest(format!(
                "character id {} is not positive",
                character_id.0
            )));
        }

        let account = self.validate_token(token).await.inspect_err(|e| {
            tracing::warn!(error = %e, "token validation failed");
        })?;
        tracing::debug!(%account, "token valid");

        let record = self
            .fetch_character(token, character_id)
            .await
            .inspect_err(|e| {
                tracing::warn!(%account, %character_id, error = %e, "character fetch failed");
            })?;

        self.config.owner_check.check(account, &record).inspect_err(|e| {
            tracing::warn!(%account, %character_id, error = %e, "owner cross-check failed");
        })?;

        tracing::debug!(%account, %character_id, name = %record.name, "character verified");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let client = HttpIdentityClient::new(IdentityConfig {
            base_url: "http://id.local/api/".into(),
            ..IdentityConfig::default()
        })
        .unwrap();
        assert_eq!(client.endpoint("auth/validate"), "http://id.local/api/auth/validate");
    }

    #[test]
    fn test_default_config_points_at_local_identity_service() {
        let config = IdentityConfig::default();
        assert_eq!(config.base_url, "http://localhost:5000/api");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.owner_check, OwnerCheck::WhenPresent);
    }

    #[tokio::test]
    async fn test_verify_empty_token_fails_without_network() {
        // Base URL points nowhere: reaching the network would surface as
        // `Unreachable`, not `InvalidRequest`.
        let client = HttpIdentityClient::new(IdentityConfig {
            base_url: "http://127.0.0.1:1".into(),
            ..IdentityConfig::default()
        })
        .unwrap();

        let result = client.verify("  ", CharacterId(7)).await;
        assert!(matches!(result, Err(VerificationError::InvalidRequest(_))));

        let result = client.verify("token", CharacterId(0)).await;
        assert!(matches!(result, Err(VerificationError::InvalidRequest(_))));
    }
}
