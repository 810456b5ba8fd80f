//! First-encounter policy: an initial consultation between a patient and
//! a provider happens in person unless a documented exception exists.

use chrono::Utc;
use telemed_core::error::TelemedResult;
use telemed_core::events::{DomainEvent, EventPublisher};
use telemed_core::models::encounter::{FirstEncounterDecision, FirstEncounterException};
use telemed_core::repository::{FirstEncounterExceptionRepository, SessionRepository};
use tracing::info;
use uuid::Uuid;

use crate::external::emit;

pub struct FirstEncounterPolicyEngine<S, X, E>
where
    S: SessionRepository,
    X: FirstEncounterExceptionRepository,
    E: EventPublisher,
{
    sessions: S,
    exceptions: X,
    publisher: E,
}

impl<S, X, E> FirstEncounterPolicyEngine<S, X, E>
where
    S: SessionRepository,
    X: FirstEncounterExceptionRepository,
    E: EventPublisher,
{
    pub fn new(sessions: S, exceptions: X, publisher: E) -> Self {
        Self {
            sessions,
            exceptions,
            publisher,
        }
    }

    /// Decide whether telemedicine may be used for this patient/provider
    /// pair.
    ///
    /// Any earlier session between the two, whatever its outcome, counts
    /// as history. Without history a non-blank `justification` is
    /// required; it is persisted as a [`FirstEncounterException`].
    pub async fn evaluate(
        &self,
        tenant_id: Uuid,
        patient_id: Uuid,
        provider_id: Uuid,
        justification: Option<&str>,
    ) -> TelemedResult<FirstEncounterDecision> {
        if self
            .sessions
            .latest_between(tenant_id, patient_id, provider_id)
            .await?
            .is_some()
        {
            return Ok(FirstEncounterDecision::returning_patient());
        }

        let Some(justification) = justification.filter(|j| !j.trim().is_empty()) else {
            info!(%tenant_id, %patient_id, %provider_id, "First encounter blocked");
            return Ok(FirstEncounterDecision::blocked());
        };

        let exception = FirstEncounterException::new(
            tenant_id,
            patient_id,
            provider_id,
            justification,
            Utc::now(),
        )?;
        let exception = self.exceptions.create(&exception).await?;

        info!(
            %tenant_id,
            exception_id = %exception.id,
            "First encounter exception granted"
        );
        emit(
            &self.publisher,
            tenant_id,
            DomainEvent::FirstEncounterExceptionGranted {
                exception_id: exception.id,
                patient_id,
                provider_id,
            },
        )
        .await;

        Ok(FirstEncounterDecision::justified(exception.id))
    }
}
