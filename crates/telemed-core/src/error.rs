//! Error types for the telemedicine compliance core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemedError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Invalid state transition for {entity}: cannot go from {from} to {to}")]
    InvalidStateTransition {
        entity: String,
        from: String,
        to: String,
    },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("Consent {id} has already been revoked")]
    AlreadyRevoked { id: String },

    #[error("Recording {id} has already been deleted")]
    AlreadyDeleted { id: String },

    #[error("Concurrent modification of {entity} with id {id}")]
    ConcurrentModification { entity: String, id: String },

    #[error("External service unavailable: {service}: {reason}")]
    ExternalServiceUnavailable { service: String, reason: String },

    #[error("Telemedicine policy violation: {reason}")]
    PolicyViolation { reason: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TelemedError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn invalid_transition(entity: &str, from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidStateTransition {
            entity: entity.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn unavailable(service: &str, reason: impl ToString) -> Self {
        Self::ExternalServiceUnavailable {
            service: service.into(),
            reason: reason.to_string(),
        }
    }
}

pub type TelemedResult<T> = Result<T, TelemedError>;

/// Reject blank (empty or whitespace-only) required text fields.
pub(crate) fn require_text(field: &str, value: &str) -> TelemedResult<()> {
    if value.trim().is_empty() {
        return Err(TelemedError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Normalize an optional text field: blank values become `None`.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
