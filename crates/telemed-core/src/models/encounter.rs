//! First-encounter policy model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{TelemedResult, require_text};

/// Outcome of a first-encounter evaluation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FirstEncounterDecision {
    pub is_first_appointment: bool,
    pub can_proceed_with_telemedicine: bool,
    /// Human-readable explanation when telemedicine is blocked.
    pub message: Option<String>,
    /// Audit record created for a justified exception.
    pub exception_id: Option<Uuid>,
}

impl FirstEncounterDecision {
    pub fn returning_patient() -> Self {
        Self {
            is_first_appointment: false,
            can_proceed_with_telemedicine: true,
            message: None,
            exception_id: None,
        }
    }

    pub fn blocked() -> Self {
        Self {
            is_first_appointment: true,
            can_proceed_with_telemedicine: false,
            message: Some(
                "First encounters with a provider must happen in person unless a documented \
                 exception is provided"
                    .into(),
            ),
            exception_id: None,
        }
    }

    pub fn justified(exception_id: Uuid) -> Self {
        Self {
            is_first_appointment: true,
            can_proceed_with_telemedicine: true,
            message: None,
            exception_id: Some(exception_id),
        }
    }
}

/// Audit record of a justified first-encounter exception.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FirstEncounterException {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub patient_id: Uuid,
    pub provider_id: Uuid,
    pub justification: String,
    pub evaluated_at: DateTime<Utc>,
}

impl FirstEncounterException {
    pub fn new(
        tenant_id: Uuid,
        patient_id: Uuid,
        provider_id: Uuid,
        justification: &str,
        now: DateTime<Utc>,
    ) -> TelemedResult<Self> {
        require_text("justification", justification)?;
        Ok(Self {
            id: Uuid::new_v4(),
            tenant_id,
            patient_id,
            provider_id,
            justification: justification.trim().to_string(),
            evaluated_at: now,
        })
    }
}
