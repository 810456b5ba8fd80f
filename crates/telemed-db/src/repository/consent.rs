//! SurrealDB implementation of [`ConsentRepository`].

use chrono::{DateTime, Utc};
use surrealdb::method::Query;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use telemed_core::error::TelemedResult;
use telemed_core::models::consent::{ConsentRecord, TelemedicineConsent};
use telemed_core::repository::{ConsentRepository, PaginatedResult, Pagination};
use uuid::Uuid;

use super::{CountRow, VersionRow, missing_or_stale, parse_opt_uuid, parse_uuid};
use crate::error::DbError;

const TABLE: &str = "telemedicine_consent";

const CONSENT_FIELDS: &str = "\
    tenant_id = $tenant_id, \
    patient_id = $patient_id, \
    appointment_id = $appointment_id, \
    consented_at = $consented_at, \
    consent_text = $consent_text, \
    consent_text_sha256 = $consent_text_sha256, \
    ip_address = $ip_address, \
    user_agent = $user_agent, \
    accepts_recording = $accepts_recording, \
    accepts_data_sharing = $accepts_data_sharing, \
    digital_signature = $digital_signature, \
    is_active = $is_active, \
    revoked_at = $revoked_at, \
    revocation_reason = $revocation_reason, \
    created_at = $created_at, \
    updated_at = $updated_at";

#[derive(Debug, SurrealValue)]
struct ConsentRow {
    record_id: String,
    tenant_id: String,
    patient_id: String,
    appointment_id: Option<String>,
    consented_at: DateTime<Utc>,
    consent_text: String,
    consent_text_sha256: String,
    ip_address: String,
    user_agent: String,
    accepts_recording: bool,
    accepts_data_sharing: bool,
    digital_signature: Option<String>,
    is_active: bool,
    revoked_at: Option<DateTime<Utc>>,
    revocation_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl ConsentRow {
    fn try_into_consent(self) -> Result<TelemedicineConsent, DbError> {
        let record = ConsentRecord {
            id: parse_uuid(TABLE, "id", &self.record_id)?,
            tenant_id: parse_uuid(TABLE, "tenant", &self.tenant_id)?,
            patient_id: parse_uuid(TABLE, "patient", &self.patient_id)?,
            appointment_id: parse_opt_uuid(TABLE, "appointment", self.appointment_id.as_deref())?,
            consented_at: self.consented_at,
            consent_text: self.consent_text,
            consent_text_sha256: self.consent_text_sha256,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            accepts_recording: self.accepts_recording,
            accepts_data_sharing: self.accepts_data_sharing,
            digital_signature: self.digital_signature,
            is_active: self.is_active,
            revoked_at: self.revoked_at,
            revocation_reason: self.revocation_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        };
        TelemedicineConsent::try_from(record).map_err(|e| DbError::decode(TABLE, e))
    }
}

fn bind_consent<'r, C: Connection>(
    query: Query<'r, C>,
    consent: &TelemedicineConsent,
) -> Query<'r, C> {
    let record = ConsentRecord::from(consent);
    query
        .bind(("id", record.id.to_string()))
        .bind(("tenant_id", record.tenant_id.to_string()))
        .bind(("patient_id", record.patient_id.to_string()))
        .bind(("appointment_id", record.appointment_id.map(|id| id.to_string())))
        .bind(("consented_at", record.consented_at))
        .bind(("consent_text", record.consent_text))
        .bind(("consent_text_sha256", record.consent_text_sha256))
        .bind(("ip_address", record.ip_address))
        .bind(("user_agent", record.user_agent))
        .bind(("accepts_recording", record.accepts_recording))
        .bind(("accepts_data_sharing", record.accepts_data_sharing))
        .bind(("digital_signature", record.digital_signature))
        .bind(("is_active", record.is_active))
        .bind(("revoked_at", record.revoked_at))
        .bind(("revocation_reason", record.revocation_reason))
        .bind(("created_at", record.created_at))
        .bind(("updated_at", record.updated_at))
}

/// SurrealDB implementation of the consent ledger store.
///
/// Consents are never deleted; revocation is an update.
#[derive(Clone)]
pub struct SurrealConsentRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealConsentRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> ConsentRepository for SurrealConsentRepository<C> {
    async fn create(&self, consent: &TelemedicineConsent) -> TelemedResult<TelemedicineConsent> {
        let sql = format!(
            "CREATE type::record('{TABLE}', $id) SET {CONSENT_FIELDS}, version = $version \
             RETURN NONE"
        );
        bind_consent(self.db.query(sql), consent)
            .bind(("version", consent.version()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::from_write(e, TABLE))?;

        Ok(consent.clone())
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> TelemedResult<TelemedicineConsent> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('telemedicine_consent', $id) \
                 WHERE tenant_id = $tenant_id",
            )
            .bind(("id", id.to_string()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ConsentRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: TABLE.into(),
            id: id.to_string(),
        })?;

        row.try_into_consent().map_err(Into::into)
    }

    async fn update(&self, consent: &TelemedicineConsent) -> TelemedResult<TelemedicineConsent> {
        let sql = format!(
            "UPDATE type::record('{TABLE}', $id) SET {CONSENT_FIELDS}, \
             version = $expected_version + 1 \
             WHERE tenant_id = $tenant_id AND version = $expected_version"
        );
        let mut result = bind_consent(self.db.query(sql), consent)
            .bind(("expected_version", consent.version()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::from_write(e, TABLE))?;
        let rows: Vec<VersionRow> = result.take(0).map_err(DbError::from)?;

        if rows.is_empty() {
            return Err(
                missing_or_stale(&self.db, TABLE, consent.tenant_id(), consent.id())
                    .await
                    .into(),
            );
        }

        let mut record = ConsentRecord::from(consent);
        record.version = consent.version() + 1;
        TelemedicineConsent::try_from(record)
    }

    async fn list_by_patient(
        &self,
        tenant_id: Uuid,
        patient_id: Uuid,
        active_only: bool,
        pagination: Pagination,
    ) -> TelemedResult<PaginatedResult<TelemedicineConsent>> {
        let filter = if active_only {
            "tenant_id = $tenant_id AND patient_id = $patient_id AND is_active = true"
        } else {
            "tenant_id = $tenant_id AND patient_id = $patient_id"
        };

        let mut result = self
            .db
            .query(format!(
                "SELECT count() AS total FROM {TABLE} WHERE {filter} GROUP ALL; \
                 SELECT meta::id(id) AS record_id, * FROM {TABLE} WHERE {filter} \
                 ORDER BY consented_at DESC LIMIT $limit START $offset"
            ))
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("patient_id", patient_id.to_string()))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);
        let rows: Vec<ConsentRow> = result.take(1).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(ConsentRow::try_into_consent)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn has_valid_consent(
        &self,
        tenant_id: Uuid,
        patient_id: Uuid,
        now: DateTime<Utc>,
    ) -> TelemedResult<bool> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM telemedicine_consent \
                 WHERE tenant_id = $tenant_id AND patient_id = $patient_id \
                 AND is_active = true AND consented_at <= $now \
                 GROUP ALL",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("patient_id", patient_id.to_string()))
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0) > 0)
    }
}
