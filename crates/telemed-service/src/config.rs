//! Service configuration.

use std::time::Duration;

use telemed_core::error::{TelemedError, TelemedResult};

/// Tunables shared by the telemedicine services.
#[derive(Debug, Clone)]
pub struct TelemedConfig {
    /// Lifetime of a freshly allocated video room (default: 2 hours).
    pub room_expiration_hours: u32,
    /// Lifetime of a participant join token (default: 120 minutes).
    pub participant_token_minutes: u32,
    /// Upper bound on any single call to an external service
    /// (default: 30 seconds).
    pub external_call_timeout: Duration,
    /// Validity of an identity verification (default: 1 year).
    pub identity_validity_years: u32,
    /// Mandatory retention of medical recordings (default: 20 years).
    pub recording_retention_years: u32,
    /// Storage prefix under which recordings are filed.
    pub recording_storage_prefix: String,
    pub recording_file_format: String,
    /// Whether ingested recordings are stored encrypted (default: true).
    pub encrypt_recordings: bool,
    /// Key used for recordings ingested at session completion. Required
    /// when `encrypt_recordings` is set.
    pub recording_encryption_key_id: Option<String>,
}

impl Default for TelemedConfig {
    fn default() -> Self {
        Self {
            room_expiration_hours: 2,
            participant_token_minutes: 120,
            external_call_timeout: Duration::from_secs(30),
            identity_validity_years: 1,
            recording_retention_years: 20,
            recording_storage_prefix: "telemedicine/recordings".into(),
            recording_file_format: "mp4".into(),
            encrypt_recordings: true,
            recording_encryption_key_id: None,
        }
    }
}

impl TelemedConfig {
    /// Reject settings the services cannot run with.
    ///
    /// Recordings ingested at session completion take their encryption
    /// key from here, so encryption without a key id is refused up front.
    pub fn validate(&self) -> TelemedResult<()> {
        let has_key = self
            .recording_encryption_key_id
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty());
        if self.encrypt_recordings && !has_key {
            return Err(TelemedError::validation(
                "encrypt_recordings is set but no recording_encryption_key_id is configured",
            ));
        }
        if self.recording_retention_years == 0 {
            return Err(TelemedError::validation(
                "recording_retention_years must be at least 1",
            ));
        }
        if self.external_call_timeout.is_zero() {
            return Err(TelemedError::validation("external_call_timeout must be positive"));
        }
        Ok(())
    }
}
