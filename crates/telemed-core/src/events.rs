//! Domain events emitted after each persisted transition.
//!
//! Delivery to connected clients belongs to an external transport; the
//! core only hands well-formed envelopes to an [`EventPublisher`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::TelemedResult;
use crate::models::identity::UserType;
use crate::models::session::SessionStatus;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    SessionCreated {
        session_id: Uuid,
        appointment_id: Uuid,
        provider_id: Uuid,
        patient_id: Uuid,
    },
    SessionStatusChanged {
        session_id: Uuid,
        from: SessionStatus,
        to: SessionStatus,
        reason: Option<String>,
    },
    SessionConsentAttached {
        session_id: Uuid,
        consent_id: Uuid,
    },
    ConsentRecorded {
        consent_id: Uuid,
        patient_id: Uuid,
        accepts_recording: bool,
        accepts_data_sharing: bool,
    },
    ConsentRevoked {
        consent_id: Uuid,
        patient_id: Uuid,
    },
    VerificationSubmitted {
        verification_id: Uuid,
        user_id: Uuid,
        user_type: UserType,
    },
    VerificationApproved {
        verification_id: Uuid,
        user_id: Uuid,
    },
    VerificationRejected {
        verification_id: Uuid,
        user_id: Uuid,
        reason: String,
    },
    VerificationExpired {
        verification_id: Uuid,
        user_id: Uuid,
    },
    FirstEncounterExceptionGranted {
        exception_id: Uuid,
        patient_id: Uuid,
        provider_id: Uuid,
    },
    RecordingStarted {
        recording_id: Uuid,
        session_id: Uuid,
        consent_id: Uuid,
    },
    RecordingInProgress {
        recording_id: Uuid,
        session_id: Uuid,
    },
    RecordingAvailable {
        recording_id: Uuid,
        session_id: Uuid,
    },
    RecordingFailed {
        recording_id: Uuid,
        session_id: Uuid,
        reason: String,
    },
    RecordingDeleted {
        recording_id: Uuid,
        session_id: Uuid,
        deleted_by: Uuid,
    },
}

impl DomainEvent {
    /// Dotted event name, e.g. `session.status_changed`.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::SessionCreated { .. } => "session.created",
            DomainEvent::SessionStatusChanged { .. } => "session.status_changed",
            DomainEvent::SessionConsentAttached { .. } => "session.consent_attached",
            DomainEvent::ConsentRecorded { .. } => "consent.recorded",
            DomainEvent::ConsentRevoked { .. } => "consent.revoked",
            DomainEvent::VerificationSubmitted { .. } => "identity.submitted",
            DomainEvent::VerificationApproved { .. } => "identity.approved",
            DomainEvent::VerificationRejected { .. } => "identity.rejected",
            DomainEvent::VerificationExpired { .. } => "identity.expired",
            DomainEvent::FirstEncounterExceptionGranted { .. } => "first_encounter.exception",
            DomainEvent::RecordingStarted { .. } => "recording.started",
            DomainEvent::RecordingInProgress { .. } => "recording.in_progress",
            DomainEvent::RecordingAvailable { .. } => "recording.available",
            DomainEvent::RecordingFailed { .. } => "recording.failed",
            DomainEvent::RecordingDeleted { .. } => "recording.deleted",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub event: DomainEvent,
}

impl EventEnvelope {
    pub fn new(tenant_id: Uuid, event: DomainEvent, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            occurred_at,
            event,
        }
    }
}

pub trait EventPublisher: Send + Sync {
    fn publish(&self, envelope: EventEnvelope) -> impl Future<Output = TelemedResult<()>> + Send;
}

/// Publisher that writes each event as a structured log record.
#[derive(Debug, Clone, Default)]
pub struct TracingEventPublisher;

impl EventPublisher for TracingEventPublisher {
    async fn publish(&self, envelope: EventEnvelope) -> TelemedResult<()> {
        let payload = serde_json::to_string(&envelope.event)
            .map_err(|e| crate::error::TelemedError::Internal(format!("event encode: {e}")))?;
        tracing::info!(
            event_id = %envelope.id,
            tenant_id = %envelope.tenant_id,
            event = envelope.event.name(),
            %payload,
            "Domain event"
        );
        Ok(())
    }
}
