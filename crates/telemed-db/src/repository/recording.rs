//! SurrealDB implementation of [`RecordingRepository`].

use chrono::{DateTime, Utc};
use surrealdb::method::Query;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use telemed_core::error::TelemedResult;
use telemed_core::models::recording::{RecordingRecord, TelemedicineRecording};
use telemed_core::repository::RecordingRepository;
use uuid::Uuid;

use super::{VersionRow, missing_or_stale, parse_opt_uuid, parse_uuid};
use crate::error::DbError;

const TABLE: &str = "telemedicine_recording";

const RECORDING_FIELDS: &str = "\
    tenant_id = $tenant_id, \
    session_id = $session_id, \
    storage_path = $storage_path, \
    file_format = $file_format, \
    size_bytes = $size_bytes, \
    duration_seconds = $duration_seconds, \
    started_at = $started_at, \
    completed_at = $completed_at, \
    status = $status, \
    is_encrypted = $is_encrypted, \
    encryption_key_id = $encryption_key_id, \
    consent_id = $consent_id, \
    retention_until = $retention_until, \
    failure_reason = $failure_reason, \
    is_deleted = $is_deleted, \
    deleted_at = $deleted_at, \
    deleted_by = $deleted_by, \
    deletion_reason = $deletion_reason, \
    created_at = $created_at, \
    updated_at = $updated_at";

#[derive(Debug, SurrealValue)]
struct RecordingRow {
    record_id: String,
    tenant_id: String,
    session_id: String,
    storage_path: String,
    file_format: String,
    size_bytes: Option<u64>,
    duration_seconds: Option<u64>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    status: String,
    is_encrypted: bool,
    encryption_key_id: Option<String>,
    consent_id: String,
    retention_until: DateTime<Utc>,
    failure_reason: Option<String>,
    is_deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
    deleted_by: Option<String>,
    deletion_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl RecordingRow {
    fn try_into_recording(self) -> Result<TelemedicineRecording, DbError> {
        let record = RecordingRecord {
            id: parse_uuid(TABLE, "id", &self.record_id)?,
            tenant_id: parse_uuid(TABLE, "tenant", &self.tenant_id)?,
            session_id: parse_uuid(TABLE, "session", &self.session_id)?,
            storage_path: self.storage_path,
            file_format: self.file_format,
            size_bytes: self.size_bytes,
            duration_seconds: self.duration_seconds,
            started_at: self.started_at,
            completed_at: self.completed_at,
            status: self
                .status
                .parse()
                .map_err(|e| DbError::decode(TABLE, e))?,
            is_encrypted: self.is_encrypted,
            encryption_key_id: self.encryption_key_id,
            consent_id: parse_uuid(TABLE, "consent", &self.consent_id)?,
            retention_until: self.retention_until,
            failure_reason: self.failure_reason,
            is_deleted: self.is_deleted,
            deleted_at: self.deleted_at,
            deleted_by: parse_opt_uuid(TABLE, "deleted_by", self.deleted_by.as_deref())?,
            deletion_reason: self.deletion_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        };
        TelemedicineRecording::try_from(record).map_err(|e| DbError::decode(TABLE, e))
    }
}

fn bind_recording<'r, C: Connection>(
    query: Query<'r, C>,
    recording: &TelemedicineRecording,
) -> Query<'r, C> {
    let record = RecordingRecord::from(recording);
    query
        .bind(("id", record.id.to_string()))
        .bind(("tenant_id", record.tenant_id.to_string()))
        .bind(("session_id", record.session_id.to_string()))
        .bind(("storage_path", record.storage_path))
        .bind(("file_format", record.file_format))
        .bind(("size_bytes", record.size_bytes))
        .bind(("duration_seconds", record.duration_seconds))
        .bind(("started_at", record.started_at))
        .bind(("completed_at", record.completed_at))
        .bind(("status", record.status.as_str()))
        .bind(("is_encrypted", record.is_encrypted))
        .bind(("encryption_key_id", record.encryption_key_id))
        .bind(("consent_id", record.consent_id.to_string()))
        .bind(("retention_until", record.retention_until))
        .bind(("failure_reason", record.failure_reason))
        .bind(("is_deleted", record.is_deleted))
        .bind(("deleted_at", record.deleted_at))
        .bind(("deleted_by", record.deleted_by.map(|id| id.to_string())))
        .bind(("deletion_reason", record.deletion_reason))
        .bind(("created_at", record.created_at))
        .bind(("updated_at", record.updated_at))
}

/// SurrealDB implementation of the recording repository.
///
/// Rows are soft-deleted through [`TelemedicineRecording::delete`]; this
/// repository never issues `DELETE`.
#[derive(Clone)]
pub struct SurrealRecordingRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealRecordingRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> RecordingRepository for SurrealRecordingRepository<C> {
    async fn create(
        &self,
        recording: &TelemedicineRecording,
    ) -> TelemedResult<TelemedicineRecording> {
        let sql = format!(
            "CREATE type::record('{TABLE}', $id) SET {RECORDING_FIELDS}, \
             version = $version RETURN NONE"
        );
        bind_recording(self.db.query(sql), recording)
            .bind(("version", recording.version()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::from_write(e, TABLE))?;

        Ok(recording.clone())
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> TelemedResult<TelemedicineRecording> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('telemedicine_recording', $id) \
                 WHERE tenant_id = $tenant_id",
            )
            .bind(("id", id.to_string()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RecordingRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: TABLE.into(),
            id: id.to_string(),
        })?;

        row.try_into_recording().map_err(Into::into)
    }

    async fn update(
        &self,
        recording: &TelemedicineRecording,
    ) -> TelemedResult<TelemedicineRecording> {
        let sql = format!(
            "UPDATE type::record('{TABLE}', $id) SET {RECORDING_FIELDS}, \
             version = $expected_version + 1 \
             WHERE tenant_id = $tenant_id AND version = $expected_version"
        );
        let mut result = bind_recording(self.db.query(sql), recording)
            .bind(("expected_version", recording.version()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::from_write(e, TABLE))?;
        let rows: Vec<VersionRow> = result.take(0).map_err(DbError::from)?;

        if rows.is_empty() {
            return Err(
                missing_or_stale(&self.db, TABLE, recording.tenant_id(), recording.id())
                    .await
                    .into(),
            );
        }

        let mut record = RecordingRecord::from(recording);
        record.version = recording.version() + 1;
        TelemedicineRecording::try_from(record)
    }

    async fn get_by_session(
        &self,
        tenant_id: Uuid,
        session_id: Uuid,
    ) -> TelemedResult<Option<TelemedicineRecording>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM telemedicine_recording \
                 WHERE tenant_id = $tenant_id AND session_id = $session_id \
                 ORDER BY created_at DESC LIMIT 1",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("session_id", session_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RecordingRow> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .next()
            .map(RecordingRow::try_into_recording)
            .transpose()
            .map_err(Into::into)
    }

    async fn list_purgeable(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
        limit: u64,
    ) -> TelemedResult<Vec<TelemedicineRecording>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM telemedicine_recording \
                 WHERE tenant_id = $tenant_id AND is_deleted = false \
                 AND retention_until <= $now \
                 ORDER BY retention_until ASC LIMIT $limit",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("now", now))
            .bind(("limit", limit))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RecordingRow> = result.take(0).map_err(DbError::from)?;
        let recordings = rows
            .into_iter()
            .map(RecordingRow::try_into_recording)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(recordings)
    }
}
