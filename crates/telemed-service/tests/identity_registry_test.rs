//! Integration tests for the identity verification registry.

mod common;

use chrono::{Duration, Utc};
use common::{Harness, setup};
use telemed_core::error::TelemedError;
use telemed_core::models::identity::{
    IdentityVerification, NewVerification, UserType, VerificationStatus,
};
use telemed_core::provider::{LicenseValidation, NationalIdValidation};
use telemed_core::repository::IdentityVerificationRepository;
use telemed_service::SubmitVerification;
use uuid::Uuid;

fn provider_submission(user_id: Uuid) -> SubmitVerification {
    SubmitVerification {
        user_id,
        user_type: UserType::Provider,
        document_type: "passport".into(),
        document_number: "FA123456".into(),
        document_photo_ref: "s3://identity/passport.jpg".into(),
        selfie_ref: Some("s3://identity/selfie.jpg".into()),
        license_photo_ref: Some("s3://identity/license.jpg".into()),
        license_number: Some("CRM-123456".into()),
        license_jurisdiction: Some("sp".into()),
        session_id: None,
        validity_years: None,
    }
}

fn patient_submission(user_id: Uuid) -> SubmitVerification {
    SubmitVerification {
        user_id,
        user_type: UserType::Patient,
        document_type: "national_id".into(),
        document_number: "52998224725".into(),
        document_photo_ref: "s3://identity/id-front.jpg".into(),
        selfie_ref: None,
        license_photo_ref: None,
        license_number: None,
        license_jurisdiction: None,
        session_id: None,
        validity_years: None,
    }
}

/// Store a verification submitted long enough ago to have lapsed.
async fn lapsed_verification(h: &Harness) -> IdentityVerification {
    let verification = IdentityVerification::submit(
        NewVerification {
            tenant_id: h.tenant_id,
            user_id: Uuid::new_v4(),
            user_type: UserType::Patient,
            document_type: "national_id".into(),
            document_number: "11144477735".into(),
            document_photo_ref: "s3://identity/old.jpg".into(),
            selfie_ref: None,
            license_photo_ref: None,
            license_number: None,
            license_jurisdiction: None,
            session_id: None,
            validity_years: 1,
        },
        Utc::now() - Duration::days(800),
    )
    .unwrap();
    h.verifications.create(&verification).await.unwrap()
}

#[tokio::test]
async fn provider_without_license_number_fails() {
    let h = setup().await;
    let mut submission = provider_submission(Uuid::new_v4());
    submission.license_number = None;

    let err = h
        .identity
        .submit_verification(h.tenant_id, submission)
        .await
        .unwrap_err();
    assert!(matches!(err, TelemedError::Validation { .. }));
}

#[tokio::test]
async fn provider_with_full_license_starts_pending_for_one_year() {
    let h = setup().await;
    let verification = h
        .identity
        .submit_verification(h.tenant_id, provider_submission(Uuid::new_v4()))
        .await
        .unwrap();

    assert_eq!(verification.status(), VerificationStatus::Pending);
    let license = verification.license().unwrap();
    assert_eq!(license.jurisdiction, "SP");
    let days = (verification.valid_until() - verification.created_at()).num_days();
    assert!((365..=366).contains(&days));
}

#[tokio::test]
async fn approval_happens_once() {
    let h = setup().await;
    let user = Uuid::new_v4();
    let verification = h
        .identity
        .submit_verification(h.tenant_id, patient_submission(user))
        .await
        .unwrap();
    assert!(!h.identity.is_user_verified(h.tenant_id, user).await.unwrap());

    let verifier = Uuid::new_v4();
    let approved = h
        .identity
        .approve(h.tenant_id, verification.id(), Some(verifier), None)
        .await
        .unwrap();
    assert_eq!(approved.status(), VerificationStatus::Verified);
    assert_eq!(approved.verifier_id(), Some(verifier));
    assert!(
        h.identity
            .is_currently_valid(h.tenant_id, verification.id())
            .await
            .unwrap()
    );
    assert!(h.identity.is_user_verified(h.tenant_id, user).await.unwrap());

    let err = h
        .identity
        .reject(h.tenant_id, verification.id(), "late rejection", None)
        .await
        .unwrap_err();
    assert!(matches!(err, TelemedError::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn rejection_requires_reason() {
    let h = setup().await;
    let verification = h
        .identity
        .submit_verification(h.tenant_id, patient_submission(Uuid::new_v4()))
        .await
        .unwrap();

    let err = h
        .identity
        .reject(h.tenant_id, verification.id(), "", None)
        .await
        .unwrap_err();
    assert!(matches!(err, TelemedError::Validation { .. }));

    let rejected = h
        .identity
        .reject(h.tenant_id, verification.id(), "document photo unreadable", None)
        .await
        .unwrap();
    assert_eq!(rejected.status(), VerificationStatus::Rejected);
    assert_eq!(rejected.rejection_reason(), Some("document photo unreadable"));
}

#[tokio::test]
async fn expiring_a_valid_verification_is_rejected() {
    let h = setup().await;
    let verification = h
        .identity
        .submit_verification(h.tenant_id, patient_submission(Uuid::new_v4()))
        .await
        .unwrap();

    let err = h
        .identity
        .expire(h.tenant_id, verification.id())
        .await
        .unwrap_err();
    assert!(matches!(err, TelemedError::Validation { .. }));
}

#[tokio::test]
async fn lapsed_verification_expires_once() {
    let h = setup().await;
    let verification = lapsed_verification(&h).await;

    assert!(h.identity.expire(h.tenant_id, verification.id()).await.unwrap());
    assert!(!h.identity.expire(h.tenant_id, verification.id()).await.unwrap());

    let stored = h
        .verifications
        .get_by_id(h.tenant_id, verification.id())
        .await
        .unwrap();
    assert_eq!(stored.status(), VerificationStatus::Expired);
}

#[tokio::test]
async fn expiry_sweep_is_idempotent() {
    let h = setup().await;
    lapsed_verification(&h).await;
    lapsed_verification(&h).await;
    h.identity
        .submit_verification(h.tenant_id, patient_submission(Uuid::new_v4()))
        .await
        .unwrap();

    assert_eq!(h.identity.expire_lapsed(h.tenant_id, 100).await.unwrap(), 2);
    assert_eq!(h.identity.expire_lapsed(h.tenant_id, 100).await.unwrap(), 0);
    assert_eq!(
        h.events
            .names()
            .iter()
            .filter(|n| **n == "identity.expired")
            .count(),
        2
    );
}

#[tokio::test]
async fn registry_confirmation_approves_provider() {
    let h = setup().await;
    h.registry.with(|s| {
        s.license = LicenseValidation {
            is_valid: true,
            holder_name: Some("Dra. Helena Prado".into()),
            status: Some("active".into()),
            error_message: None,
        }
    });
    let verification = h
        .identity
        .submit_verification(h.tenant_id, provider_submission(Uuid::new_v4()))
        .await
        .unwrap();

    let validated = h
        .identity
        .validate_against_registry(h.tenant_id, verification.id())
        .await
        .unwrap();
    assert_eq!(validated.status(), VerificationStatus::Verified);
    assert!(validated.notes().unwrap().contains("CRM-123456"));
}

#[tokio::test]
async fn registry_denial_rejects_patient() {
    let h = setup().await;
    h.registry
        .with(|s| s.national_id = NationalIdValidation::invalid("national id not registered"));
    let verification = h
        .identity
        .submit_verification(h.tenant_id, patient_submission(Uuid::new_v4()))
        .await
        .unwrap();

    let validated = h
        .identity
        .validate_against_registry(h.tenant_id, verification.id())
        .await
        .unwrap();
    assert_eq!(validated.status(), VerificationStatus::Rejected);
    assert_eq!(validated.rejection_reason(), Some("national id not registered"));
}

#[tokio::test]
async fn unreachable_registry_leaves_verification_pending() {
    let h = setup().await;
    h.registry.with(|s| s.unreachable = true);
    let verification = h
        .identity
        .submit_verification(h.tenant_id, patient_submission(Uuid::new_v4()))
        .await
        .unwrap();

    let err = h
        .identity
        .validate_against_registry(h.tenant_id, verification.id())
        .await
        .unwrap_err();
    assert!(matches!(err, TelemedError::ExternalServiceUnavailable { .. }));

    let stored = h
        .verifications
        .get_by_id(h.tenant_id, verification.id())
        .await
        .unwrap();
    assert_eq!(stored.status(), VerificationStatus::Pending);
}

#[tokio::test]
async fn lapsed_submission_cannot_be_approved() {
    let h = setup().await;
    let verification = lapsed_verification(&h).await;

    let err = h
        .identity
        .approve(h.tenant_id, verification.id(), Some(Uuid::new_v4()), None)
        .await
        .unwrap_err();
    assert!(matches!(err, TelemedError::Validation { .. }));

    let stored = h
        .verifications
        .get_by_id(h.tenant_id, verification.id())
        .await
        .unwrap();
    assert_eq!(stored.status(), VerificationStatus::Pending);
    assert!(!h.events.names().contains(&"identity.approved"));
}
