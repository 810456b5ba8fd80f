//! Contracts for the external systems the core depends on.
//!
//! Implementations live outside this crate (see `telemed-providers`).
//! The core never special-cases a concrete provider.

use serde::{Deserialize, Serialize};

use crate::error::TelemedResult;
use crate::models::session::VideoRoom;

/// Video-conferencing provider abstraction.
///
/// Transport failures surface as
/// [`TelemedError::ExternalServiceUnavailable`](crate::error::TelemedError).
pub trait VideoProvider: Send + Sync {
    /// Allocate a room that expires after `expiration_hours`.
    fn create_room(
        &self,
        name: &str,
        expiration_hours: u32,
    ) -> impl Future<Output = TelemedResult<VideoRoom>> + Send;

    /// Issue a participant token scoped to one room.
    fn generate_token(
        &self,
        room_name: &str,
        user_id: &str,
        user_name: &str,
        expiration_minutes: u32,
    ) -> impl Future<Output = TelemedResult<String>> + Send;

    fn delete_room(&self, room_name: &str) -> impl Future<Output = TelemedResult<()>> + Send;

    /// URL of the room's recording, or `None` when nothing was recorded.
    fn get_recording_url(
        &self,
        room_name: &str,
    ) -> impl Future<Output = TelemedResult<Option<String>>> + Send;
}

/// Result of a professional-license lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LicenseValidation {
    pub is_valid: bool,
    pub holder_name: Option<String>,
    /// Registry standing (e.g. `active`, `suspended`).
    pub status: Option<String>,
    pub error_message: Option<String>,
}

impl LicenseValidation {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error_message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Result of a national-id lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NationalIdValidation {
    pub is_valid: bool,
    pub error_message: Option<String>,
}

impl NationalIdValidation {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error_message: Some(message.into()),
        }
    }
}

/// Read-only lookups against an external national registry.
///
/// A not-found or non-2xx answer is a normal `is_valid = false` result,
/// never an error.
pub trait RegistryValidator: Send + Sync {
    fn validate_license(
        &self,
        number: &str,
        jurisdiction: &str,
    ) -> impl Future<Output = TelemedResult<LicenseValidation>> + Send;

    fn validate_national_id(
        &self,
        national_id: &str,
    ) -> impl Future<Output = TelemedResult<NationalIdValidation>> + Send;
}
