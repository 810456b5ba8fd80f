//! Integration tests for the recording retention engine.

mod common;

use chrono::{Duration, Utc};
use common::setup;
use telemed_core::error::TelemedError;
use telemed_core::models::recording::{NewRecording, RecordingStatus, TelemedicineRecording};
use telemed_core::repository::RecordingRepository;
use telemed_service::BeginRecording;
use uuid::Uuid;

fn request(consent_id: Uuid) -> BeginRecording {
    BeginRecording {
        session_id: Uuid::new_v4(),
        consent_id,
        ..Default::default()
    }
}

#[tokio::test]
async fn consent_then_begin_recording_succeeds() {
    let h = setup().await;
    let consent = h.record_consent(Uuid::new_v4(), true).await;

    let recording = h
        .retention
        .begin_recording(h.tenant_id, request(consent.id()))
        .await
        .unwrap();

    assert_eq!(recording.status(), RecordingStatus::Pending);
    assert_eq!(recording.consent_id(), consent.id());
    assert!(recording.is_encrypted());
    assert_eq!(recording.encryption_key_id(), Some("kms-test-key"));
    assert_eq!(recording.file_format(), "mp4");
    assert!(recording.storage_path().starts_with("telemedicine/recordings/"));
    let years = (recording.retention_until() - recording.created_at()).num_days() / 365;
    assert_eq!(years, 20);
    assert!(h.retention.should_retain(h.tenant_id, recording.id()).await.unwrap());
}

#[tokio::test]
async fn nil_consent_fails_before_any_lookup() {
    let h = setup().await;
    let err = h
        .retention
        .begin_recording(h.tenant_id, request(Uuid::nil()))
        .await
        .unwrap_err();
    assert!(matches!(err, TelemedError::Validation { .. }));
}

#[tokio::test]
async fn unknown_or_non_recording_consent_is_refused() {
    let h = setup().await;
    let err = h
        .retention
        .begin_recording(h.tenant_id, request(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, TelemedError::NotFound { .. }));

    let consent = h.record_consent(Uuid::new_v4(), false).await;
    let err = h
        .retention
        .begin_recording(h.tenant_id, request(consent.id()))
        .await
        .unwrap_err();
    assert!(matches!(err, TelemedError::PolicyViolation { .. }));
}

#[tokio::test]
async fn revoked_consent_cannot_authorize_recording() {
    let h = setup().await;
    let consent = h.record_consent(Uuid::new_v4(), true).await;
    h.ledger
        .revoke_consent(h.tenant_id, consent.id(), "withdrawn")
        .await
        .unwrap();

    let err = h
        .retention
        .begin_recording(h.tenant_id, request(consent.id()))
        .await
        .unwrap_err();
    assert!(matches!(err, TelemedError::PolicyViolation { .. }));
}

#[tokio::test]
async fn encrypted_recording_without_key_fails() {
    let h = setup().await;
    let consent = h.record_consent(Uuid::new_v4(), true).await;
    let mut begin = request(consent.id());
    begin.encrypted = Some(true);
    begin.encryption_key_id = Some("  ".into());

    let engine = telemed_service::RecordingRetentionEngine::new(
        h.recordings.clone(),
        h.consents.clone(),
        h.events.clone(),
        telemed_service::TelemedConfig::default(),
    );
    let err = engine.begin_recording(h.tenant_id, begin).await.unwrap_err();
    assert!(matches!(err, TelemedError::Validation { .. }));
}

#[tokio::test]
async fn recording_lifecycle_and_terminal_rules() {
    let h = setup().await;
    let consent = h.record_consent(Uuid::new_v4(), true).await;
    let recording = h
        .retention
        .begin_recording(h.tenant_id, request(consent.id()))
        .await
        .unwrap();

    let recording = h
        .retention
        .mark_recording(h.tenant_id, recording.id())
        .await
        .unwrap();
    assert_eq!(recording.status(), RecordingStatus::Recording);
    assert_eq!(
        h.events
            .names()
            .into_iter()
            .filter(|n| n.starts_with("recording."))
            .collect::<Vec<_>>(),
        vec!["recording.started", "recording.in_progress"]
    );

    let err = h
        .retention
        .complete_recording(h.tenant_id, recording.id(), 0, 60)
        .await
        .unwrap_err();
    assert!(matches!(err, TelemedError::Validation { .. }));

    let available = h
        .retention
        .complete_recording(h.tenant_id, recording.id(), 52_428_800, 1_500)
        .await
        .unwrap();
    assert_eq!(available.status(), RecordingStatus::Available);
    assert_eq!(available.duration_seconds(), Some(1_500));

    let err = h
        .retention
        .fail_recording(h.tenant_id, recording.id(), "transcode error")
        .await
        .unwrap_err();
    assert!(matches!(err, TelemedError::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn failed_recording_keeps_reason() {
    let h = setup().await;
    let consent = h.record_consent(Uuid::new_v4(), true).await;
    let recording = h
        .retention
        .begin_recording(h.tenant_id, request(consent.id()))
        .await
        .unwrap();

    let failed = h
        .retention
        .fail_recording(h.tenant_id, recording.id(), "provider lost the media")
        .await
        .unwrap();
    assert_eq!(failed.status(), RecordingStatus::Failed);
    assert_eq!(failed.failure_reason(), Some("provider lost the media"));
}

#[tokio::test]
async fn deletion_is_audited_and_happens_once() {
    let h = setup().await;
    let consent = h.record_consent(Uuid::new_v4(), true).await;
    let recording = h
        .retention
        .begin_recording(h.tenant_id, request(consent.id()))
        .await
        .unwrap();
    let operator = Uuid::new_v4();

    let err = h
        .retention
        .delete_recording(h.tenant_id, recording.id(), operator, "")
        .await
        .unwrap_err();
    assert!(matches!(err, TelemedError::Validation { .. }));

    let deleted = h
        .retention
        .delete_recording(h.tenant_id, recording.id(), operator, "court order 2024/118")
        .await
        .unwrap();
    assert!(deleted.is_deleted());
    let deletion = deleted.deletion().unwrap();
    assert_eq!(deletion.deleted_by, operator);
    assert_eq!(deletion.reason, "court order 2024/118");

    let err = h
        .retention
        .delete_recording(h.tenant_id, recording.id(), operator, "again")
        .await
        .unwrap_err();
    assert!(matches!(err, TelemedError::AlreadyDeleted { .. }));
}

#[tokio::test]
async fn only_recordings_past_retention_are_purgeable() {
    let h = setup().await;
    let consent = h.record_consent(Uuid::new_v4(), true).await;
    h.retention
        .begin_recording(h.tenant_id, request(consent.id()))
        .await
        .unwrap();

    let old = TelemedicineRecording::begin(
        NewRecording {
            tenant_id: h.tenant_id,
            session_id: Uuid::new_v4(),
            consent_id: consent.id(),
            storage_path_hint: "archive".into(),
            file_format: "webm".into(),
            encrypted: true,
            encryption_key_id: Some("kms-legacy".into()),
            retention_years: 1,
        },
        Utc::now() - Duration::days(800),
    )
    .unwrap();
    h.recordings.create(&old).await.unwrap();

    let purgeable = h.retention.list_purgeable(h.tenant_id, 10).await.unwrap();
    assert_eq!(purgeable.len(), 1);
    assert_eq!(purgeable[0].id(), old.id());
    assert!(!h.retention.should_retain(h.tenant_id, old.id()).await.unwrap());
}
