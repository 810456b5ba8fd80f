//! SurrealDB implementation of [`SessionRepository`].

use chrono::{DateTime, Utc};
use surrealdb::method::Query;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use telemed_core::error::TelemedResult;
use telemed_core::models::session::{SessionRecord, TelemedicineSession};
use telemed_core::repository::{PaginatedResult, Pagination, SessionRepository};
use uuid::Uuid;

use super::{VersionRow, count_where, missing_or_stale, parse_opt_uuid, parse_uuid};
use crate::error::DbError;

const TABLE: &str = "telemedicine_session";

const SESSION_FIELDS: &str = "\
    tenant_id = $tenant_id, \
    appointment_id = $appointment_id, \
    clinic_id = $clinic_id, \
    provider_id = $provider_id, \
    patient_id = $patient_id, \
    room_name = $room_name, \
    room_url = $room_url, \
    room_expires_at = $room_expires_at, \
    status = $status, \
    started_at = $started_at, \
    ended_at = $ended_at, \
    recording_enabled = $recording_enabled, \
    consent_id = $consent_id, \
    recording_url = $recording_url, \
    notes = $notes, \
    status_reason = $status_reason, \
    active_slot = $active_slot, \
    created_at = $created_at, \
    updated_at = $updated_at";

#[derive(Debug, SurrealValue)]
struct SessionRow {
    record_id: String,
    tenant_id: String,
    appointment_id: String,
    clinic_id: String,
    provider_id: String,
    patient_id: String,
    room_name: String,
    room_url: String,
    room_expires_at: DateTime<Utc>,
    status: String,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    recording_enabled: bool,
    consent_id: Option<String>,
    recording_url: Option<String>,
    notes: Option<String>,
    status_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl SessionRow {
    fn try_into_session(self) -> Result<TelemedicineSession, DbError> {
        let record = SessionRecord {
            id: parse_uuid(TABLE, "id", &self.record_id)?,
            tenant_id: parse_uuid(TABLE, "tenant", &self.tenant_id)?,
            appointment_id: parse_uuid(TABLE, "appointment", &self.appointment_id)?,
            clinic_id: parse_uuid(TABLE, "clinic", &self.clinic_id)?,
            provider_id: parse_uuid(TABLE, "provider", &self.provider_id)?,
            patient_id: parse_uuid(TABLE, "patient", &self.patient_id)?,
            room_name: self.room_name,
            room_url: self.room_url,
            room_expires_at: self.room_expires_at,
            status: self
                .status
                .parse()
                .map_err(|e| DbError::decode(TABLE, e))?,
            started_at: self.started_at,
            ended_at: self.ended_at,
            recording_enabled: self.recording_enabled,
            consent_id: parse_opt_uuid(TABLE, "consent", self.consent_id.as_deref())?,
            recording_url: self.recording_url,
            notes: self.notes,
            status_reason: self.status_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        };
        TelemedicineSession::try_from(record).map_err(|e| DbError::decode(TABLE, e))
    }
}

/// Value of the `active_slot` column.
///
/// Live sessions claim their appointment id; finished ones release it.
fn active_slot(session: &TelemedicineSession) -> String {
    if session.is_active() {
        session.appointment_id().to_string()
    } else {
        format!("closed:{}", session.id())
    }
}

fn bind_session<'r, C: Connection>(
    query: Query<'r, C>,
    session: &TelemedicineSession,
) -> Query<'r, C> {
    let record = SessionRecord::from(session);
    query
        .bind(("id", record.id.to_string()))
        .bind(("tenant_id", record.tenant_id.to_string()))
        .bind(("appointment_id", record.appointment_id.to_string()))
        .bind(("clinic_id", record.clinic_id.to_string()))
        .bind(("provider_id", record.provider_id.to_string()))
        .bind(("patient_id", record.patient_id.to_string()))
        .bind(("room_name", record.room_name))
        .bind(("room_url", record.room_url))
        .bind(("room_expires_at", record.room_expires_at))
        .bind(("status", record.status.as_str()))
        .bind(("started_at", record.started_at))
        .bind(("ended_at", record.ended_at))
        .bind(("recording_enabled", record.recording_enabled))
        .bind(("consent_id", record.consent_id.map(|id| id.to_string())))
        .bind(("recording_url", record.recording_url))
        .bind(("notes", record.notes))
        .bind(("status_reason", record.status_reason))
        .bind(("active_slot", active_slot(session)))
        .bind(("created_at", record.created_at))
        .bind(("updated_at", record.updated_at))
}

/// SurrealDB implementation of the session repository.
#[derive(Clone)]
pub struct SurrealSessionRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealSessionRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn select_many(
        &self,
        sql: &'static str,
        binds: Vec<(&'static str, String)>,
        pagination: Option<&Pagination>,
    ) -> Result<Vec<TelemedicineSession>, DbError> {
        let mut query = self.db.query(sql);
        for bind in binds {
            query = query.bind(bind);
        }
        if let Some(page) = pagination {
            query = query
                .bind(("limit", page.limit))
                .bind(("offset", page.offset));
        }
        let mut result = query.await?;
        let rows: Vec<SessionRow> = result.take(0)?;
        rows.into_iter().map(SessionRow::try_into_session).collect()
    }
}

impl<C: Connection> SessionRepository for SurrealSessionRepository<C> {
    async fn create(&self, session: &TelemedicineSession) -> TelemedResult<TelemedicineSession> {
        let sql = format!(
            "CREATE type::record('{TABLE}', $id) SET {SESSION_FIELDS}, version = $version \
             RETURN NONE"
        );
        let query = bind_session(self.db.query(sql), session).bind(("version", session.version()));

        query
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::from_write(e, TABLE))?;

        Ok(session.clone())
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> TelemedResult<TelemedicineSession> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('telemedicine_session', $id) \
                 WHERE tenant_id = $tenant_id",
            )
            .bind(("id", id.to_string()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SessionRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: TABLE.into(),
            id: id.to_string(),
        })?;

        row.try_into_session().map_err(Into::into)
    }

    async fn update(&self, session: &TelemedicineSession) -> TelemedResult<TelemedicineSession> {
        let sql = format!(
            "UPDATE type::record('{TABLE}', $id) SET {SESSION_FIELDS}, \
             version = $expected_version + 1 \
             WHERE tenant_id = $tenant_id AND version = $expected_version"
        );
        let query = bind_session(self.db.query(sql), session)
            .bind(("expected_version", session.version()));

        let mut result = query
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::from_write(e, TABLE))?;
        let rows: Vec<VersionRow> = result.take(0).map_err(DbError::from)?;

        if rows.is_empty() {
            return Err(
                missing_or_stale(&self.db, TABLE, session.tenant_id(), session.id())
                    .await
                    .into(),
            );
        }

        let mut record = SessionRecord::from(session);
        record.version = session.version() + 1;
        TelemedicineSession::try_from(record)
    }

    async fn get_active_by_appointment(
        &self,
        tenant_id: Uuid,
        appointment_id: Uuid,
    ) -> TelemedResult<Option<TelemedicineSession>> {
        let sessions = self
            .select_many(
                "SELECT meta::id(id) AS record_id, * FROM telemedicine_session \
                 WHERE tenant_id = $tenant_id AND active_slot = $appointment_id \
                 LIMIT 1",
                vec![
                    ("tenant_id", tenant_id.to_string()),
                    ("appointment_id", appointment_id.to_string()),
                ],
                None,
            )
            .await?;
        Ok(sessions.into_iter().next())
    }

    async fn latest_between(
        &self,
        tenant_id: Uuid,
        patient_id: Uuid,
        provider_id: Uuid,
    ) -> TelemedResult<Option<TelemedicineSession>> {
        let sessions = self
            .select_many(
                "SELECT meta::id(id) AS record_id, * FROM telemedicine_session \
                 WHERE tenant_id = $tenant_id AND patient_id = $patient_id \
                 AND provider_id = $provider_id \
                 ORDER BY created_at DESC LIMIT 1",
                vec![
                    ("tenant_id", tenant_id.to_string()),
                    ("patient_id", patient_id.to_string()),
                    ("provider_id", provider_id.to_string()),
                ],
                None,
            )
            .await?;
        Ok(sessions.into_iter().next())
    }

    async fn list_by_patient(
        &self,
        tenant_id: Uuid,
        patient_id: Uuid,
        pagination: Pagination,
    ) -> TelemedResult<PaginatedResult<TelemedicineSession>> {
        let binds = vec![
            ("tenant_id", tenant_id.to_string()),
            ("patient_id", patient_id.to_string()),
        ];
        let total = count_where(
            &self.db,
            TABLE,
            "tenant_id = $tenant_id AND patient_id = $patient_id",
            binds.clone(),
        )
        .await?;

        let items = self
            .select_many(
                "SELECT meta::id(id) AS record_id, * FROM telemedicine_session \
                 WHERE tenant_id = $tenant_id AND patient_id = $patient_id \
                 ORDER BY created_at DESC \
                 LIMIT $limit START $offset",
                binds,
                Some(&pagination),
            )
            .await?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
