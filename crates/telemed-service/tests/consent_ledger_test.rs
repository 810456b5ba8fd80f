//! Integration tests for the consent ledger.

mod common;

use common::setup;
use telemed_core::error::TelemedError;
use telemed_core::repository::Pagination;
use uuid::Uuid;

#[tokio::test]
async fn recorded_consent_is_valid_until_revoked() {
    let h = setup().await;
    let patient = Uuid::new_v4();
    assert!(!h.ledger.has_valid_consent(h.tenant_id, patient).await.unwrap());

    let consent = h.record_consent(patient, true).await;
    assert!(consent.is_active());
    assert_eq!(consent.consent_text_sha256().len(), 64);
    assert!(h.ledger.has_valid_consent(h.tenant_id, patient).await.unwrap());

    let revoked = h
        .ledger
        .revoke_consent(h.tenant_id, consent.id(), "no longer wish to be recorded")
        .await
        .unwrap();
    assert!(!revoked.is_active());
    assert!(!h.ledger.has_valid_consent(h.tenant_id, patient).await.unwrap());
    assert_eq!(h.events.names(), vec!["consent.recorded", "consent.revoked"]);
}

#[tokio::test]
async fn double_revocation_is_already_revoked() {
    let h = setup().await;
    let consent = h.record_consent(Uuid::new_v4(), false).await;

    h.ledger
        .revoke_consent(h.tenant_id, consent.id(), "withdrawn")
        .await
        .unwrap();
    let err = h
        .ledger
        .revoke_consent(h.tenant_id, consent.id(), "withdrawn again")
        .await
        .unwrap_err();
    assert!(matches!(err, TelemedError::AlreadyRevoked { .. }));
}

#[tokio::test]
async fn revocation_requires_a_reason() {
    let h = setup().await;
    let consent = h.record_consent(Uuid::new_v4(), false).await;

    let err = h
        .ledger
        .revoke_consent(h.tenant_id, consent.id(), "   ")
        .await
        .unwrap_err();
    assert!(matches!(err, TelemedError::Validation { .. }));

    let stored = h.ledger.get_consent(h.tenant_id, consent.id()).await.unwrap();
    assert!(stored.is_active());
}

#[tokio::test]
async fn consent_capture_requires_client_metadata() {
    let h = setup().await;
    let patient = Uuid::new_v4();

    let mut missing_ip = h.consent_input(patient, true);
    missing_ip.ip_address = String::new();
    let err = h.ledger.record_consent(missing_ip).await.unwrap_err();
    assert!(matches!(err, TelemedError::Validation { .. }));

    let mut missing_text = h.consent_input(patient, true);
    missing_text.consent_text = " ".into();
    let err = h.ledger.record_consent(missing_text).await.unwrap_err();
    assert!(matches!(err, TelemedError::Validation { .. }));

    assert!(!h.ledger.has_valid_consent(h.tenant_id, patient).await.unwrap());
}

#[tokio::test]
async fn patient_history_is_newest_first_and_filterable() {
    let h = setup().await;
    let patient = Uuid::new_v4();

    let first = h.record_consent(patient, false).await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = h.record_consent(patient, true).await;
    h.ledger
        .revoke_consent(h.tenant_id, first.id(), "superseded")
        .await
        .unwrap();

    let all = h
        .ledger
        .get_patient_consents(h.tenant_id, patient, false, Pagination::default())
        .await
        .unwrap();
    assert_eq!(all.total, 2);
    assert_eq!(all.items[0].id(), second.id());
    assert_eq!(all.items[1].id(), first.id());

    let active = h
        .ledger
        .get_patient_consents(h.tenant_id, patient, true, Pagination::default())
        .await
        .unwrap();
    assert_eq!(active.total, 1);
    assert_eq!(active.items[0].id(), second.id());
}

#[tokio::test]
async fn consent_for_appointment_marks_live_session_consented() {
    let h = setup().await;
    let patient = Uuid::new_v4();
    let request = h.session_request(patient, Uuid::new_v4());
    let session = h
        .manager
        .create_session(h.tenant_id, request.clone())
        .await
        .unwrap();
    assert!(session.consent_id().is_none());

    let mut input = h.consent_input(patient, true);
    input.appointment_id = Some(request.appointment_id);
    let consent = h.ledger.record_consent(input).await.unwrap();

    let session = h.manager.get_session(h.tenant_id, session.id()).await.unwrap();
    assert_eq!(session.consent_id(), Some(consent.id()));
    assert!(h.events.names().contains(&"session.consent_attached"));
}

#[tokio::test]
async fn consent_from_another_patient_is_not_attached() {
    let h = setup().await;
    let request = h.session_request(Uuid::new_v4(), Uuid::new_v4());
    let session = h
        .manager
        .create_session(h.tenant_id, request.clone())
        .await
        .unwrap();

    let mut input = h.consent_input(Uuid::new_v4(), true);
    input.appointment_id = Some(request.appointment_id);
    h.ledger.record_consent(input).await.unwrap();

    let session = h.manager.get_session(h.tenant_id, session.id()).await.unwrap();
    assert!(session.consent_id().is_none());
}
