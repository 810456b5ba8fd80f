//! Telemedicine recording domain model.
//!
//! ```text
//! Pending -> Recording -> Available | Failed
//! (any non-deleted) -> Deleted
//! ```
//!
//! A recording always references the consent that authorized it and
//! carries a retention deadline fixed at creation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{TelemedError, TelemedResult, non_blank, require_text};

const ENTITY: &str = "telemedicine_recording";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RecordingStatus {
    Pending,
    Recording,
    Available,
    Failed,
    Deleted,
}

impl RecordingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordingStatus::Pending => "Pending",
            RecordingStatus::Recording => "Recording",
            RecordingStatus::Available => "Available",
            RecordingStatus::Failed => "Failed",
            RecordingStatus::Deleted => "Deleted",
        }
    }
}

impl fmt::Display for RecordingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordingStatus {
    type Err = TelemedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(RecordingStatus::Pending),
            "Recording" => Ok(RecordingStatus::Recording),
            "Available" => Ok(RecordingStatus::Available),
            "Failed" => Ok(RecordingStatus::Failed),
            "Deleted" => Ok(RecordingStatus::Deleted),
            other => Err(TelemedError::validation(format!(
                "unknown recording status: {other}"
            ))),
        }
    }
}

/// Audit trail of an explicit deletion.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Deletion {
    pub deleted_at: DateTime<Utc>,
    pub deleted_by: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct NewRecording {
    pub tenant_id: Uuid,
    pub session_id: Uuid,
    pub consent_id: Uuid,
    /// Directory-like prefix; the final path also embeds the session and
    /// recording ids.
    pub storage_path_hint: String,
    pub file_format: String,
    pub encrypted: bool,
    pub encryption_key_id: Option<String>,
    pub retention_years: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TelemedicineRecording {
    id: Uuid,
    tenant_id: Uuid,
    session_id: Uuid,
    storage_path: String,
    file_format: String,
    size_bytes: Option<u64>,
    duration_seconds: Option<u64>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    status: RecordingStatus,
    is_encrypted: bool,
    encryption_key_id: Option<String>,
    consent_id: Uuid,
    retention_until: DateTime<Utc>,
    failure_reason: Option<String>,
    deletion: Option<Deletion>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl TelemedicineRecording {
    /// Create a `Pending` recording.
    ///
    /// Fails without a consent id, and when encryption is requested
    /// without a key id.
    pub fn begin(input: NewRecording, now: DateTime<Utc>) -> TelemedResult<Self> {
        if input.consent_id.is_nil() {
            return Err(TelemedError::validation(
                "a recording requires the id of the consent that authorized it",
            ));
        }
        let encryption_key_id = non_blank(input.encryption_key_id);
        if input.encrypted && encryption_key_id.is_none() {
            return Err(TelemedError::validation(
                "encrypted recordings require an encryption key id",
            ));
        }
        require_text("file_format", &input.file_format)?;
        let file_format = input.file_format.trim().trim_start_matches('.').to_ascii_lowercase();
        if !file_format.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(TelemedError::validation(format!(
                "malformed file format: {file_format}"
            )));
        }
        if input.retention_years == 0 {
            return Err(TelemedError::validation(
                "retention_years must be at least 1",
            ));
        }
        let retention_until = now
            .checked_add_months(Months::new(input.retention_years.saturating_mul(12)))
            .ok_or_else(|| TelemedError::validation("retention_years out of range"))?;

        let id = Uuid::new_v4();
        let prefix = input.storage_path_hint.trim().trim_end_matches('/');
        let storage_path = if prefix.is_empty() {
            format!("{}/{}/{id}.{file_format}", input.tenant_id, input.session_id)
        } else {
            format!(
                "{prefix}/{}/{}/{id}.{file_format}",
                input.tenant_id, input.session_id
            )
        };

        Ok(Self {
            id,
            tenant_id: input.tenant_id,
            session_id: input.session_id,
            storage_path,
            file_format,
            size_bytes: None,
            duration_seconds: None,
            started_at: None,
            completed_at: None,
            status: RecordingStatus::Pending,
            is_encrypted: input.encrypted,
            encryption_key_id,
            consent_id: input.consent_id,
            retention_until,
            failure_reason: None,
            deletion: None,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn storage_path(&self) -> &str {
        &self.storage_path
    }

    pub fn file_format(&self) -> &str {
        &self.file_format
    }

    pub fn size_bytes(&self) -> Option<u64> {
        self.size_bytes
    }

    pub fn duration_seconds(&self) -> Option<u64> {
        self.duration_seconds
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn status(&self) -> RecordingStatus {
        self.status
    }

    pub fn is_encrypted(&self) -> bool {
        self.is_encrypted
    }

    pub fn encryption_key_id(&self) -> Option<&str> {
        self.encryption_key_id.as_deref()
    }

    pub fn consent_id(&self) -> Uuid {
        self.consent_id
    }

    pub fn retention_until(&self) -> DateTime<Utc> {
        self.retention_until
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn deletion(&self) -> Option<&Deletion> {
        self.deletion.as_ref()
    }

    pub fn is_deleted(&self) -> bool {
        self.status == RecordingStatus::Deleted
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// True while the legal retention window is still running.
    pub fn should_retain(&self, now: DateTime<Utc>) -> bool {
        now < self.retention_until
    }

    pub fn mark_recording(&mut self, now: DateTime<Utc>) -> TelemedResult<()> {
        self.require(&[RecordingStatus::Pending], RecordingStatus::Recording)?;
        self.status = RecordingStatus::Recording;
        self.started_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn complete(
        &mut self,
        size_bytes: i64,
        duration_seconds: i64,
        now: DateTime<Utc>,
    ) -> TelemedResult<()> {
        self.require(
            &[RecordingStatus::Pending, RecordingStatus::Recording],
            RecordingStatus::Available,
        )?;
        let size_bytes = positive("size_bytes", size_bytes)?;
        let duration_seconds = positive("duration_seconds", duration_seconds)?;

        self.status = RecordingStatus::Available;
        self.size_bytes = Some(size_bytes);
        self.duration_seconds = Some(duration_seconds);
        self.started_at.get_or_insert(now);
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn fail(&mut self, reason: &str, now: DateTime<Utc>) -> TelemedResult<()> {
        require_text("failure reason", reason)?;
        self.require(
            &[RecordingStatus::Pending, RecordingStatus::Recording],
            RecordingStatus::Failed,
        )?;
        self.status = RecordingStatus::Failed;
        self.failure_reason = Some(reason.trim().to_string());
        self.updated_at = now;
        Ok(())
    }

    pub fn delete(&mut self, deleted_by: Uuid, reason: &str, now: DateTime<Utc>) -> TelemedResult<()> {
        if self.is_deleted() {
            return Err(TelemedError::AlreadyDeleted {
                id: self.id.to_string(),
            });
        }
        require_text("deletion reason", reason)?;
        if deleted_by.is_nil() {
            return Err(TelemedError::validation("deleted_by must identify a user"));
        }
        self.status = RecordingStatus::Deleted;
        self.deletion = Some(Deletion {
            deleted_at: now,
            deleted_by,
            reason: reason.trim().to_string(),
        });
        self.updated_at = now;
        Ok(())
    }

    fn require(&self, allowed: &[RecordingStatus], to: RecordingStatus) -> TelemedResult<()> {
        if !allowed.contains(&self.status) {
            return Err(TelemedError::invalid_transition(ENTITY, self.status, to));
        }
        Ok(())
    }
}

fn positive(field: &str, value: i64) -> TelemedResult<u64> {
    u64::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| TelemedError::validation(format!("{field} out of range: {value}")))
}

/// Flat persistence shape of a recording.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordingRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub session_id: Uuid,
    pub storage_path: String,
    pub file_format: String,
    pub size_bytes: Option<u64>,
    pub duration_seconds: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RecordingStatus,
    pub is_encrypted: bool,
    pub encryption_key_id: Option<String>,
    pub consent_id: Uuid,
    pub retention_until: DateTime<Utc>,
    pub failure_reason: Option<String>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
    pub deletion_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl From<&TelemedicineRecording> for RecordingRecord {
    fn from(r: &TelemedicineRecording) -> Self {
        Self {
            id: r.id,
            tenant_id: r.tenant_id,
            session_id: r.session_id,
            storage_path: r.storage_path.clone(),
            file_format: r.file_format.clone(),
            size_bytes: r.size_bytes,
            duration_seconds: r.duration_seconds,
            started_at: r.started_at,
            completed_at: r.completed_at,
            status: r.status,
            is_encrypted: r.is_encrypted,
            encryption_key_id: r.encryption_key_id.clone(),
            consent_id: r.consent_id,
            retention_until: r.retention_until,
            failure_reason: r.failure_reason.clone(),
            is_deleted: r.is_deleted(),
            deleted_at: r.deletion.as_ref().map(|d| d.deleted_at),
            deleted_by: r.deletion.as_ref().map(|d| d.deleted_by),
            deletion_reason: r.deletion.as_ref().map(|d| d.reason.clone()),
            created_at: r.created_at,
            updated_at: r.updated_at,
            version: r.version,
        }
    }
}

impl TryFrom<RecordingRecord> for TelemedicineRecording {
    type Error = TelemedError;

    fn try_from(r: RecordingRecord) -> Result<Self, Self::Error> {
        if r.consent_id.is_nil() {
            return Err(TelemedError::validation(format!(
                "recording {} has no authorizing consent",
                r.id
            )));
        }
        if r.is_encrypted && r.encryption_key_id.is_none() {
            return Err(TelemedError::validation(format!(
                "recording {} is encrypted without a key id",
                r.id
            )));
        }
        let deletion = match (r.is_deleted, r.deleted_at, r.deleted_by, r.deletion_reason) {
            (false, None, None, None) => None,
            (true, Some(deleted_at), Some(deleted_by), Some(reason)) => Some(Deletion {
                deleted_at,
                deleted_by,
                reason,
            }),
            _ => {
                return Err(TelemedError::validation(format!(
                    "recording {} has inconsistent deletion fields",
                    r.id
                )));
            }
        };
        if deletion.is_some() != (r.status == RecordingStatus::Deleted) {
            return Err(TelemedError::validation(format!(
                "recording {} status {} disagrees with its deletion flag",
                r.id, r.status
            )));
        }

        Ok(Self {
            id: r.id,
            tenant_id: r.tenant_id,
            session_id: r.session_id,
            storage_path: r.storage_path,
            file_format: r.file_format,
            size_bytes: r.size_bytes,
            duration_seconds: r.duration_seconds,
            started_at: r.started_at,
            completed_at: r.completed_at,
            status: r.status,
            is_encrypted: r.is_encrypted,
            encryption_key_id: r.encryption_key_id,
            consent_id: r.consent_id,
            retention_until: r.retention_until,
            failure_reason: r.failure_reason,
            deletion,
            created_at: r.created_at,
            updated_at: r.updated_at,
            version: r.version,
        })
    }
}
