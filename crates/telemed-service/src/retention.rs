//! Recording retention engine: recording lifecycle, mandatory retention
//! and audited deletion.

use chrono::Utc;
use telemed_core::error::{TelemedError, TelemedResult};
use telemed_core::events::{DomainEvent, EventPublisher};
use telemed_core::models::recording::{NewRecording, TelemedicineRecording};
use telemed_core::repository::{ConsentRepository, RecordingRepository};
use tracing::info;
use uuid::Uuid;

use crate::config::TelemedConfig;
use crate::external::emit;

/// Request to start tracking a recording.
///
/// Unset options fall back to the engine's [`TelemedConfig`].
#[derive(Debug, Clone, Default)]
pub struct BeginRecording {
    pub session_id: Uuid,
    /// Consent that authorizes this recording. Must not be nil.
    pub consent_id: Uuid,
    pub storage_path_hint: Option<String>,
    pub file_format: Option<String>,
    pub encrypted: Option<bool>,
    pub encryption_key_id: Option<String>,
    pub retention_years: Option<u32>,
}

pub struct RecordingRetentionEngine<R, C, E>
where
    R: RecordingRepository,
    C: ConsentRepository,
    E: EventPublisher,
{
    recordings: R,
    consents: C,
    publisher: E,
    config: TelemedConfig,
}

impl<R, C, E> RecordingRetentionEngine<R, C, E>
where
    R: RecordingRepository,
    C: ConsentRepository,
    E: EventPublisher,
{
    pub fn new(recordings: R, consents: C, publisher: E, config: TelemedConfig) -> Self {
        Self {
            recordings,
            consents,
            publisher,
            config,
        }
    }

    /// Create a `Pending` recording backed by a current consent that
    /// accepts recording.
    pub async fn begin_recording(
        &self,
        tenant_id: Uuid,
        request: BeginRecording,
    ) -> TelemedResult<TelemedicineRecording> {
        let now = Utc::now();
        let recording = TelemedicineRecording::begin(
            NewRecording {
                tenant_id,
                session_id: request.session_id,
                consent_id: request.consent_id,
                storage_path_hint: request
                    .storage_path_hint
                    .unwrap_or_else(|| self.config.recording_storage_prefix.clone()),
                file_format: request
                    .file_format
                    .unwrap_or_else(|| self.config.recording_file_format.clone()),
                encrypted: request.encrypted.unwrap_or(self.config.encrypt_recordings),
                encryption_key_id: request
                    .encryption_key_id
                    .or_else(|| self.config.recording_encryption_key_id.clone()),
                retention_years: request
                    .retention_years
                    .unwrap_or(self.config.recording_retention_years),
            },
            now,
        )?;

        let consent = self
            .consents
            .get_by_id(tenant_id, recording.consent_id())
            .await?;
        if !consent.authorizes_recording(now) {
            return Err(TelemedError::PolicyViolation {
                reason: format!(
                    "consent {} does not currently authorize recording",
                    consent.id()
                ),
            });
        }

        let recording = self.recordings.create(&recording).await?;

        info!(
            %tenant_id,
            recording_id = %recording.id(),
            session_id = %recording.session_id(),
            retention_until = %recording.retention_until(),
            "Recording started"
        );
        emit(
            &self.publisher,
            tenant_id,
            DomainEvent::RecordingStarted {
                recording_id: recording.id(),
                session_id: recording.session_id(),
                consent_id: recording.consent_id(),
            },
        )
        .await;

        Ok(recording)
    }

    pub async fn mark_recording(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> TelemedResult<TelemedicineRecording> {
        let mut recording = self.recordings.get_by_id(tenant_id, id).await?;
        recording.mark_recording(Utc::now())?;
        let recording = self.recordings.update(&recording).await?;
        info!(%tenant_id, recording_id = %id, "Recording in progress");
        emit(
            &self.publisher,
            tenant_id,
            DomainEvent::RecordingInProgress {
                recording_id: id,
                session_id: recording.session_id(),
            },
        )
        .await;

        Ok(recording)
    }

    pub async fn complete_recording(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        size_bytes: i64,
        duration_seconds: i64,
    ) -> TelemedResult<TelemedicineRecording> {
        let mut recording = self.recordings.get_by_id(tenant_id, id).await?;
        recording.complete(size_bytes, duration_seconds, Utc::now())?;
        let recording = self.recordings.update(&recording).await?;

        info!(%tenant_id, recording_id = %id, size_bytes, duration_seconds, "Recording available");
        emit(
            &self.publisher,
            tenant_id,
            DomainEvent::RecordingAvailable {
                recording_id: id,
                session_id: recording.session_id(),
            },
        )
        .await;

        Ok(recording)
    }

    pub async fn fail_recording(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        reason: &str,
    ) -> TelemedResult<TelemedicineRecording> {
        let mut recording = self.recordings.get_by_id(tenant_id, id).await?;
        recording.fail(reason, Utc::now())?;
        let recording = self.recordings.update(&recording).await?;

        info!(%tenant_id, recording_id = %id, "Recording failed");
        emit(
            &self.publisher,
            tenant_id,
            DomainEvent::RecordingFailed {
                recording_id: id,
                session_id: recording.session_id(),
                reason: reason.trim().to_string(),
            },
        )
        .await;

        Ok(recording)
    }

    /// Soft-delete a recording, keeping who deleted it and why.
    pub async fn delete_recording(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        deleted_by: Uuid,
        reason: &str,
    ) -> TelemedResult<TelemedicineRecording> {
        let mut recording = self.recordings.get_by_id(tenant_id, id).await?;
        recording.delete(deleted_by, reason, Utc::now())?;
        let recording = self.recordings.update(&recording).await?;

        info!(%tenant_id, recording_id = %id, %deleted_by, "Recording deleted");
        emit(
            &self.publisher,
            tenant_id,
            DomainEvent::RecordingDeleted {
                recording_id: id,
                session_id: recording.session_id(),
                deleted_by,
            },
        )
        .await;

        Ok(recording)
    }

    pub async fn should_retain(&self, tenant_id: Uuid, id: Uuid) -> TelemedResult<bool> {
        let recording = self.recordings.get_by_id(tenant_id, id).await?;
        Ok(recording.should_retain(Utc::now()))
    }

    /// Recordings whose retention window has elapsed and that are not yet
    /// deleted. Nothing is deleted here.
    pub async fn list_purgeable(
        &self,
        tenant_id: Uuid,
        limit: u64,
    ) -> TelemedResult<Vec<TelemedicineRecording>> {
        self.recordings
            .list_purgeable(tenant_id, Utc::now(), limit)
            .await
    }

    pub async fn get_by_session(
        &self,
        tenant_id: Uuid,
        session_id: Uuid,
    ) -> TelemedResult<Option<TelemedicineRecording>> {
        self.recordings.get_by_session(tenant_id, session_id).await
    }
}
