//! Video provider whose REST API issues both rooms and join tokens.

use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use telemed_core::error::TelemedResult;
use telemed_core::models::session::VideoRoom;
use telemed_core::provider::VideoProvider;

use crate::config::HostedRoomConfig;
use crate::error::{ProviderError, ensure_success};

const SERVICE: &str = "video_provider";

#[derive(Debug, Deserialize)]
struct RoomResponse {
    name: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct RecordingList {
    #[serde(default)]
    data: Vec<RecordingEntry>,
}

#[derive(Debug, Deserialize)]
struct RecordingEntry {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct AccessLink {
    download_link: String,
}

#[derive(Debug, Serialize)]
struct RoomProperties {
    exp: i64,
    enable_recording: Option<&'static str>,
}

/// Client for a hosted video service with pre-built room URLs.
#[derive(Clone)]
pub struct HostedRoomVideoProvider {
    client: Client,
    config: HostedRoomConfig,
}

impl HostedRoomVideoProvider {
    pub fn new(config: HostedRoomConfig) -> Result<Self, ProviderError> {
        if config.api_key.is_empty() {
            return Err(ProviderError::Config("video API key is empty".into()));
        }
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ProviderError::transport(SERVICE))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ProviderError> {
        let response = request
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(ProviderError::transport(SERVICE))?;
        ensure_success(SERVICE, response).await
    }

    async fn latest_finished_recording(&self, room_name: &str) -> Result<Option<String>, ProviderError> {
        let list: RecordingList = self
            .send(
                self.client
                    .get(self.endpoint("recordings"))
                    .query(&[("room_name", room_name)]),
            )
            .await?
            .json()
            .await
            .map_err(ProviderError::payload(SERVICE))?;

        Ok(list
            .data
            .into_iter()
            .find(|r| r.status == "finished")
            .map(|r| r.id))
    }
}

pub(crate) fn expiry(hours: u32, now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::hours(i64::from(hours))
}

impl VideoProvider for HostedRoomVideoProvider {
    async fn create_room(&self, name: &str, expiration_hours: u32) -> TelemedResult<VideoRoom> {
        let expires_at = expiry(expiration_hours, Utc::now());
        let properties = RoomProperties {
            exp: expires_at.timestamp(),
            enable_recording: self.config.cloud_recording.then_some("cloud"),
        };
        let body = json!({
            "name": name,
            "privacy": "private",
            "properties": properties,
        });

        let room: RoomResponse = self
            .send(self.client.post(self.endpoint("rooms")).json(&body))
            .await?
            .json()
            .await
            .map_err(ProviderError::payload(SERVICE))?;

        tracing::debug!(room = %room.name, "Video room created");
        Ok(VideoRoom {
            name: room.name,
            url: room.url,
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
        let exp = (Utc::now() + Duration::minutes(i64::from(expiration_minutes))).timestamp();
        let body = json!({
            "properties": {
                "room_name": room_name,
                "user_id": user_id,
                "user_name": user_name,
                "exp": exp,
            }
        });

        let token: TokenResponse = self
            .send(self.client.post(self.endpoint("meeting-tokens")).json(&body))
            .await?
            .json()
            .await
            .map_err(ProviderError::payload(SERVICE))?;
        Ok(token.token)
    }

    async fn delete_room(&self, room_name: &str) -> TelemedResult<()> {
        let response = self
            .client
            .delete(self.endpoint(&format!("rooms/{room_name}")))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(ProviderError::transport(SERVICE))?;

        // Already gone.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(SERVICE, response).await?;
        Ok(())
    }

    async fn get_recording_url(&self, room_name: &str) -> TelemedResult<Option<String>> {
        let Some(recording_id) = self.latest_finished_recording(room_name).await? else {
            return Ok(None);
        };

        let link: AccessLink = self
            .send(
                self.client
                    .get(self.endpoint(&format!("recordings/{recording_id}/access-link"))),
            )
            .await?
            .json()
            .await
            .map_err(ProviderError::payload(SERVICE))?;
        Ok(Some(link.download_link))
    }
}
