//! Integration tests for the first-encounter policy engine.

mod common;

use common::setup;
use telemed_core::repository::FirstEncounterExceptionRepository;
use uuid::Uuid;

#[tokio::test]
async fn first_encounter_without_justification_is_blocked() {
    let h = setup().await;
    let decision = h
        .policy
        .evaluate(h.tenant_id, Uuid::new_v4(), Uuid::new_v4(), None)
        .await
        .unwrap();

    assert!(decision.is_first_appointment);
    assert!(!decision.can_proceed_with_telemedicine);
    assert!(decision.message.is_some());
    assert!(decision.exception_id.is_none());
}

#[tokio::test]
async fn blank_justification_counts_as_none() {
    let h = setup().await;
    let decision = h
        .policy
        .evaluate(h.tenant_id, Uuid::new_v4(), Uuid::new_v4(), Some("   "))
        .await
        .unwrap();
    assert!(!decision.can_proceed_with_telemedicine);
}

#[tokio::test]
async fn justified_first_encounter_is_permitted_and_audited() {
    let h = setup().await;
    let (patient, provider) = (Uuid::new_v4(), Uuid::new_v4());

    let decision = h
        .policy
        .evaluate(
            h.tenant_id,
            patient,
            provider,
            Some("rural patient, nearest clinic 300km away"),
        )
        .await
        .unwrap();

    assert!(decision.is_first_appointment);
    assert!(decision.can_proceed_with_telemedicine);
    let exceptions = h
        .exceptions
        .list_for_pair(h.tenant_id, patient, provider)
        .await
        .unwrap();
    assert_eq!(exceptions.len(), 1);
    assert_eq!(decision.exception_id, Some(exceptions[0].id));
    assert_eq!(h.events.names(), vec!["first_encounter.exception"]);
}

#[tokio::test]
async fn prior_session_waives_the_restriction() {
    let h = setup().await;
    let (patient, provider) = (Uuid::new_v4(), Uuid::new_v4());
    let session = h
        .manager
        .create_session(h.tenant_id, h.session_request(patient, provider))
        .await
        .unwrap();
    h.manager
        .mark_failed(h.tenant_id, session.id(), None)
        .await
        .unwrap();

    let decision = h
        .policy
        .evaluate(h.tenant_id, patient, provider, None)
        .await
        .unwrap();
    assert!(!decision.is_first_appointment);
    assert!(decision.can_proceed_with_telemedicine);
}
