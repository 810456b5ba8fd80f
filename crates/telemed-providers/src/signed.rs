//! Video provider that signs participant tokens locally.
//!
//! Rooms are managed over the provider's REST API using a short-lived
//! admin token; participant tokens are HS256 JWTs signed with the
//! account secret and never leave this process unsigned.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use telemed_core::error::TelemedResult;
use telemed_core::models::session::VideoRoom;
use telemed_core::provider::VideoProvider;

use crate::config::SignedTokenConfig;
use crate::error::{ProviderError, ensure_success};
use crate::hosted::expiry;

const SERVICE: &str = "video_provider";
const ADMIN_TOKEN_MINUTES: i64 = 5;

/// Grants carried by a token.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default)]
    pub room_join: bool,
    #[serde(default)]
    pub room_admin: bool,
}

/// JWT claims of a participant or admin token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantClaims {
    /// Account key id.
    pub iss: String,
    /// Participant identity (user id), or the key id for admin tokens.
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub nbf: i64,
    pub exp: i64,
    pub video: VideoGrant,
}

#[derive(Debug, Deserialize)]
struct RecordingInfo {
    url: Option<String>,
}

#[derive(Clone)]
pub struct SignedTokenVideoProvider {
    client: Client,
    config: SignedTokenConfig,
}

impl SignedTokenVideoProvider {
    pub fn new(config: SignedTokenConfig) -> Result<Self, ProviderError> {
        if config.api_key.is_empty() || config.api_secret.is_empty() {
            return Err(ProviderError::Config(
                "video API key and secret are required".into(),
            ));
        }
        if config.join_base_url.is_empty() {
            return Err(ProviderError::Config("join base URL is empty".into()));
        }
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ProviderError::transport(SERVICE))?;
        Ok(Self { client, config })
    }

    /// Sign a participant token for one room.
    pub fn participant_token(
        &self,
        room_name: &str,
        user_id: &str,
        user_name: &str,
        expiration_minutes: u32,
    ) -> Result<String, ProviderError> {
        let now = Utc::now();
        let claims = ParticipantClaims {
            iss: self.config.api_key.clone(),
            sub: user_id.to_string(),
            name: Some(user_name.to_string()),
            nbf: now.timestamp(),
            exp: (now + Duration::minutes(i64::from(expiration_minutes))).timestamp(),
            video: VideoGrant {
                room: Some(room_name.to_string()),
                room_join: true,
                room_admin: false,
            },
        };
        self.sign(&claims)
    }

    fn admin_token(&self) -> Result<String, ProviderError> {
        let now = Utc::now();
        let claims = ParticipantClaims {
            iss: self.config.api_key.clone(),
            sub: self.config.api_key.clone(),
            name: None,
            nbf: now.timestamp(),
            exp: (now + Duration::minutes(ADMIN_TOKEN_MINUTES)).timestamp(),
            video: VideoGrant {
                room_admin: true,
                ..Default::default()
            },
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &ParticipantClaims) -> Result<String, ProviderError> {
        let key = EncodingKey::from_secret(self.config.api_secret.as_bytes());
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &key)
            .map_err(|e| ProviderError::Token(format!("JWT encode: {e}")))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    fn room_url(&self, name: &str) -> String {
        format!("{}/{}", self.config.join_base_url.trim_end_matches('/'), name)
    }
}

impl VideoProvider for SignedTokenVideoProvider {
    async fn create_room(&self, name: &str, expiration_hours: u32) -> TelemedResult<VideoRoom> {
        let expires_at = expiry(expiration_hours, Utc::now());
        let response = self
            .client
            .post(self.endpoint("rooms"))
            .bearer_auth(self.admin_token()?)
            .json(&json!({ "name": name, "expires_at": expires_at.timestamp() }))
            .send()
            .await
            .map_err(ProviderError::transport(SERVICE))?;
        ensure_success(SERVICE, response).await?;

        Ok(VideoRoom {
            name: name.to_string(),
            url: self.room_url(name),
            expires_at,
        })
    }

    async fn generate_token(
        &self,
        room_name: &str,
        user_id: &str,
        user_name: &str,
        expiration_minutes: u32,
    ) -> TelemedResult<String> {
        Ok(self.participant_token(room_name, user_id, user_name, expiration_minutes)?)
    }

    async fn delete_room(&self, room_name: &str) -> TelemedResult<()> {
        let response = self
            .client
            .delete(self.endpoint(&format!("rooms/{room_name}")))
            .bearer_auth(self.admin_token()?)
            .send()
            .await
            .map_err(ProviderError::transport(SERVICE))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(SERVICE, response).await?;
        Ok(())
    }

    async fn get_recording_url(&self, room_name: &str) -> TelemedResult<Option<String>> {
        let response = self
            .client
            .get(self.endpoint(&format!("rooms/{room_name}/recording")))
            .bearer_auth(self.admin_token()?)
            .send()
            .await
            .map_err(ProviderError::transport(SERVICE))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let info: RecordingInfo = ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(ProviderError::payload(SERVICE))?;
        Ok(info.url)
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{DecodingKey, Validation};

    use super::*;

    fn provider() -> SignedTokenVideoProvider {
        SignedTokenVideoProvider::new(SignedTokenConfig {
            api_base_url: "https://video.test/api".into(),
            join_base_url: "https://meet.test/".into(),
            api_key: "key-1".into(),
            api_secret: "secret-with-enough-entropy".into(),
            ..Default::default()
        })
        .unwrap()
    }

    fn decode(token: &str) -> ParticipantClaims {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&["key-1"]);
        jsonwebtoken::decode::<ParticipantClaims>(
            token,
            &DecodingKey::from_secret(b"secret-with-enough-entropy"),
            &validation,
        )
        .unwrap()
        .claims
    }

    #[test]
    fn participant_token_is_scoped_to_room() {
        let token = provider()
            .participant_token("telemed-abc", "user-1", "Dr. Ana", 120)
            .unwrap();
        let claims = decode(&token);

        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.name.as_deref(), Some("Dr. Ana"));
        assert_eq!(claims.video.room.as_deref(), Some("telemed-abc"));
        assert!(claims.video.room_join);
        assert!(!claims.video.room_admin);
        assert_eq!(claims.exp - claims.nbf, 120 * 60);
    }

    #[test]
    fn admin_token_carries_no_room() {
        let claims = decode(&provider().admin_token().unwrap());
        assert!(claims.video.room_admin);
        assert!(claims.video.room.is_none());
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let token = provider().participant_token("r", "u", "n", 5).unwrap();
        let result = jsonwebtoken::decode::<ParticipantClaims>(
            &token,
            &DecodingKey::from_secret(b"other"),
            &Validation::new(Algorithm::HS256),
        );
        assert!(result.is_err());
    }

    #[test]
    fn room_url_appends_name() {
        assert_eq!(provider().room_url("telemed-x"), "https://meet.test/telemed-x");
    }

    #[test]
    fn missing_secret_is_rejected() {
        let err = SignedTokenVideoProvider::new(SignedTokenConfig {
            api_key: "k".into(),
            join_base_url: "https://meet.test".into(),
            ..Default::default()
        })
        .err();
        assert!(matches!(err, Some(ProviderError::Config(_))));
    }
}
