//! SurrealDB implementation of [`FirstEncounterExceptionRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use telemed_core::error::TelemedResult;
use telemed_core::models::encounter::FirstEncounterException;
use telemed_core::repository::FirstEncounterExceptionRepository;
use uuid::Uuid;

use super::parse_uuid;
use crate::error::DbError;

const TABLE: &str = "first_encounter_exception";

#[derive(Debug, SurrealValue)]
struct ExceptionRow {
    record_id: String,
    tenant_id: String,
    patient_id: String,
    provider_id: String,
    justification: String,
    evaluated_at: DateTime<Utc>,
}

impl ExceptionRow {
    fn try_into_exception(self) -> Result<FirstEncounterException, DbError> {
        Ok(FirstEncounterException {
            id: parse_uuid(TABLE, "id", &self.record_id)?,
            tenant_id: parse_uuid(TABLE, "tenant", &self.tenant_id)?,
            patient_id: parse_uuid(TABLE, "patient", &self.patient_id)?,
            provider_id: parse_uuid(TABLE, "provider", &self.provider_id)?,
            justification: self.justification,
            evaluated_at: self.evaluated_at,
        })
    }
}

/// Append-only audit store for justified first-encounter exceptions.
#[derive(Clone)]
pub struct SurrealFirstEncounterExceptionRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealFirstEncounterExceptionRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> FirstEncounterExceptionRepository
    for SurrealFirstEncounterExceptionRepository<C>
{
    async fn create(
        &self,
        exception: &FirstEncounterException,
    ) -> TelemedResult<FirstEncounterException> {
        self.db
            .query(
                "CREATE type::record('first_encounter_exception', $id) SET \
                 tenant_id = $tenant_id, \
                 patient_id = $patient_id, \
                 provider_id = $provider_id, \
                 justification = $justification, \
                 evaluated_at = $evaluated_at \
                 RETURN NONE",
            )
            .bind(("id", exception.id.to_string()))
            .bind(("tenant_id", exception.tenant_id.to_string()))
            .bind(("patient_id", exception.patient_id.to_string()))
            .bind(("provider_id", exception.provider_id.to_string()))
            .bind(("justification", exception.justification.clone()))
            .bind(("evaluated_at", exception.evaluated_at))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::from_write(e, TABLE))?;

        Ok(exception.clone())
    }

    async fn list_for_pair(
        &self,
        tenant_id: Uuid,
        patient_id: Uuid,
        provider_id: Uuid,
    ) -> TelemedResult<Vec<FirstEncounterException>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM first_encounter_exception \
                 WHERE tenant_id = $tenant_id AND patient_id = $patient_id \
                 AND provider_id = $provider_id \
                 ORDER BY evaluated_at DESC",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("patient_id", patient_id.to_string()))
            .bind(("provider_id", provider_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ExceptionRow> = result.take(0).map_err(DbError::from)?;
        let exceptions = rows
            .into_iter()
            .map(ExceptionRow::try_into_exception)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(exceptions)
    }
}
