//! Consent ledger: capture, query and revoke patient consent.

use chrono::Utc;
use telemed_core::error::TelemedResult;
use telemed_core::events::{DomainEvent, EventPublisher};
use telemed_core::models::consent::{NewConsent, TelemedicineConsent};
use telemed_core::repository::{
    ConsentRepository, PaginatedResult, Pagination, SessionRepository,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::external::emit;

/// Records and revokes patient consent.
///
/// Consents are never deleted. A recorded consent that names an
/// appointment with a live session also marks that session consented.
pub struct ConsentLedger<C, S, E>
where
    C: ConsentRepository,
    S: SessionRepository,
    E: EventPublisher,
{
    consents: C,
    sessions: S,
    publisher: E,
}

impl<C, S, E> ConsentLedger<C, S, E>
where
    C: ConsentRepository,
    S: SessionRepository,
    E: EventPublisher,
{
    pub fn new(consents: C, sessions: S, publisher: E) -> Self {
        Self {
            consents,
            sessions,
            publisher,
        }
    }

    pub async fn record_consent(&self, input: NewConsent) -> TelemedResult<TelemedicineConsent> {
        let now = Utc::now();
        let consent = TelemedicineConsent::record(input, now)?;
        let consent = self.consents.create(&consent).await?;
        let tenant_id = consent.tenant_id();

        info!(
            %tenant_id,
            consent_id = %consent.id(),
            patient_id = %consent.patient_id(),
            accepts_recording = consent.accepts_recording(),
            "Consent recorded"
        );
        emit(
            &self.publisher,
            tenant_id,
            DomainEvent::ConsentRecorded {
                consent_id: consent.id(),
                patient_id: consent.patient_id(),
                accepts_recording: consent.accepts_recording(),
                accepts_data_sharing: consent.accepts_data_sharing(),
            },
        )
        .await;

        if let Some(appointment_id) = consent.appointment_id() {
            if let Err(err) = self.attach_to_session(&consent, appointment_id).await {
                warn!(
                    %tenant_id,
                    consent_id = %consent.id(),
                    %appointment_id,
                    error = %err,
                    "Consent recorded but the session could not be marked consented"
                );
            }
        }

        Ok(consent)
    }

    async fn attach_to_session(
        &self,
        consent: &TelemedicineConsent,
        appointment_id: Uuid,
    ) -> TelemedResult<()> {
        let tenant_id = consent.tenant_id();
        let Some(mut session) = self
            .sessions
            .get_active_by_appointment(tenant_id, appointment_id)
            .await?
        else {
            return Ok(());
        };

        if session.patient_id() != consent.patient_id() {
            warn!(
                %tenant_id,
                session_id = %session.id(),
                consent_id = %consent.id(),
                "Consent patient does not match the session patient, not attaching"
            );
            return Ok(());
        }

        session.mark_consented(consent.id(), Utc::now())?;
        let session = self.sessions.update(&session).await?;

        info!(
            %tenant_id,
            session_id = %session.id(),
            consent_id = %consent.id(),
            "Session marked consented"
        );
        emit(
            &self.publisher,
            tenant_id,
            DomainEvent::SessionConsentAttached {
                session_id: session.id(),
                consent_id: consent.id(),
            },
        )
        .await;
        Ok(())
    }

    pub async fn revoke_consent(
        &self,
        tenant_id: Uuid,
        consent_id: Uuid,
        reason: &str,
    ) -> TelemedResult<TelemedicineConsent> {
        let mut consent = self.consents.get_by_id(tenant_id, consent_id).await?;
        consent.revoke(reason, Utc::now())?;
        let consent = self.consents.update(&consent).await?;

        info!(%tenant_id, %consent_id, "Consent revoked");
        emit(
            &self.publisher,
            tenant_id,
            DomainEvent::ConsentRevoked {
                consent_id,
                patient_id: consent.patient_id(),
            },
        )
        .await;

        Ok(consent)
    }

    /// Whether the patient currently holds an active consent.
    pub async fn has_valid_consent(&self, tenant_id: Uuid, patient_id: Uuid) -> TelemedResult<bool> {
        self.consents
            .has_valid_consent(tenant_id, patient_id, Utc::now())
            .await
    }

    /// Consent history of a patient, newest first.
    pub async fn get_patient_consents(
        &self,
        tenant_id: Uuid,
        patient_id: Uuid,
        active_only: bool,
        pagination: Pagination,
    ) -> TelemedResult<PaginatedResult<TelemedicineConsent>> {
        self.consents
            .list_by_patient(tenant_id, patient_id, active_only, pagination)
            .await
    }

    pub async fn get_consent(
        &self,
        tenant_id: Uuid,
        consent_id: Uuid,
    ) -> TelemedResult<TelemedicineConsent> {
        self.consents.get_by_id(tenant_id, consent_id).await
    }
}
