//! Database-specific error types and conversions.

use telemed_core::error::TelemedError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Stored {entity} could not be decoded: {reason}")]
    Decode { entity: String, reason: String },

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Duplicate {entity}")]
    Duplicate { entity: String },

    #[error("Stale write to {entity} with id {id}")]
    Stale { entity: String, id: String },
}

impl DbError {
    /// Classify an error reported by `Response::check` on a write.
    ///
    /// Unique-index and record-id collisions become [`DbError::Duplicate`].
    pub(crate) fn from_write(err: surrealdb::Error, entity: &str) -> Self {
        let message = err.to_string();
        if message.contains("already contains") || message.contains("already exists") {
            DbError::Duplicate {
                entity: entity.into(),
            }
        } else {
            DbError::Query(message)
        }
    }

    pub(crate) fn decode(entity: &str, reason: impl ToString) -> Self {
        DbError::Decode {
            entity: entity.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<DbError> for TelemedError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => TelemedError::NotFound { entity, id },
            DbError::Duplicate { entity } => TelemedError::AlreadyExists { entity },
            DbError::Stale { entity, id } => TelemedError::ConcurrentModification { entity, id },
            other => TelemedError::Database(other.to_string()),
        }
    }
}
