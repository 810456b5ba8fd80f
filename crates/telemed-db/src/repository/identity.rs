//! SurrealDB implementation of [`IdentityVerificationRepository`].

use chrono::{DateTime, Utc};
use surrealdb::method::Query;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use telemed_core::error::TelemedResult;
use telemed_core::models::identity::{IdentityVerification, VerificationRecord};
use telemed_core::repository::IdentityVerificationRepository;
use uuid::Uuid;

use super::{VersionRow, missing_or_stale, parse_opt_uuid, parse_uuid};
use crate::error::DbError;

const TABLE: &str = "identity_verification";

const VERIFICATION_FIELDS: &str = "\
    tenant_id = $tenant_id, \
    user_id = $user_id, \
    user_type = $user_type, \
    document_type = $document_type, \
    document_number = $document_number, \
    document_photo_ref = $document_photo_ref, \
    selfie_ref = $selfie_ref, \
    license_photo_ref = $license_photo_ref, \
    license_number = $license_number, \
    license_jurisdiction = $license_jurisdiction, \
    status = $status, \
    verified_at = $verified_at, \
    verifier_id = $verifier_id, \
    notes = $notes, \
    rejection_reason = $rejection_reason, \
    session_id = $session_id, \
    valid_until = $valid_until, \
    created_at = $created_at, \
    updated_at = $updated_at";

#[derive(Debug, SurrealValue)]
struct VerificationRow {
    record_id: String,
    tenant_id: String,
    user_id: String,
    user_type: String,
    document_type: String,
    document_number: String,
    document_photo_ref: String,
    selfie_ref: Option<String>,
    license_photo_ref: Option<String>,
    license_number: Option<String>,
    license_jurisdiction: Option<String>,
    status: String,
    verified_at: Option<DateTime<Utc>>,
    verifier_id: Option<String>,
    notes: Option<String>,
    rejection_reason: Option<String>,
    session_id: Option<String>,
    valid_until: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl VerificationRow {
    fn try_into_verification(self) -> Result<IdentityVerification, DbError> {
        let record = VerificationRecord {
            id: parse_uuid(TABLE, "id", &self.record_id)?,
            tenant_id: parse_uuid(TABLE, "tenant", &self.tenant_id)?,
            user_id: parse_uuid(TABLE, "user", &self.user_id)?,
            user_type: self
                .user_type
                .parse()
                .map_err(|e| DbError::decode(TABLE, e))?,
            document_type: self.document_type,
            document_number: self.document_number,
            document_photo_ref: self.document_photo_ref,
            selfie_ref: self.selfie_ref,
            license_photo_ref: self.license_photo_ref,
            license_number: self.license_number,
            license_jurisdiction: self.license_jurisdiction,
            status: self
                .status
                .parse()
                .map_err(|e| DbError::decode(TABLE, e))?,
            verified_at: self.verified_at,
            verifier_id: parse_opt_uuid(TABLE, "verifier", self.verifier_id.as_deref())?,
            notes: self.notes,
            rejection_reason: self.rejection_reason,
            session_id: parse_opt_uuid(TABLE, "session", self.session_id.as_deref())?,
            valid_until: self.valid_until,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        };
        IdentityVerification::try_from(record).map_err(|e| DbError::decode(TABLE, e))
    }
}

fn bind_verification<'r, C: Connection>(
    query: Query<'r, C>,
    verification: &IdentityVerification,
) -> Query<'r, C> {
    let record = VerificationRecord::from(verification);
    query
        .bind(("id", record.id.to_string()))
        .bind(("tenant_id", record.tenant_id.to_string()))
        .bind(("user_id", record.user_id.to_string()))
        .bind(("user_type", record.user_type.as_str()))
        .bind(("document_type", record.document_type))
        .bind(("document_number", record.document_number))
        .bind(("document_photo_ref", record.document_photo_ref))
        .bind(("selfie_ref", record.selfie_ref))
        .bind(("license_photo_ref", record.license_photo_ref))
        .bind(("license_number", record.license_number))
        .bind(("license_jurisdiction", record.license_jurisdiction))
        .bind(("status", record.status.as_str()))
        .bind(("verified_at", record.verified_at))
        .bind(("verifier_id", record.verifier_id.map(|id| id.to_string())))
        .bind(("notes", record.notes))
        .bind(("rejection_reason", record.rejection_reason))
        .bind(("session_id", record.session_id.map(|id| id.to_string())))
        .bind(("valid_until", record.valid_until))
        .bind(("created_at", record.created_at))
        .bind(("updated_at", record.updated_at))
}

/// SurrealDB implementation of the identity verification repository.
#[derive(Clone)]
pub struct SurrealIdentityVerificationRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealIdentityVerificationRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> IdentityVerificationRepository for SurrealIdentityVerificationRepository<C> {
    async fn create(
        &self,
        verification: &IdentityVerification,
    ) -> TelemedResult<IdentityVerification> {
        let sql = format!(
            "CREATE type::record('{TABLE}', $id) SET {VERIFICATION_FIELDS}, \
             version = $version RETURN NONE"
        );
        bind_verification(self.db.query(sql), verification)
            .bind(("version", verification.version()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::from_write(e, TABLE))?;

        Ok(verification.clone())
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> TelemedResult<IdentityVerification> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('identity_verification', $id) \
                 WHERE tenant_id = $tenant_id",
            )
            .bind(("id", id.to_string()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<VerificationRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: TABLE.into(),
            id: id.to_string(),
        })?;

        row.try_into_verification().map_err(Into::into)
    }

    async fn update(
        &self,
        verification: &IdentityVerification,
    ) -> TelemedResult<IdentityVerification> {
        let sql = format!(
            "UPDATE type::record('{TABLE}', $id) SET {VERIFICATION_FIELDS}, \
             version = $expected_version + 1 \
             WHERE tenant_id = $tenant_id AND version = $expected_version"
        );
        let mut result = bind_verification(self.db.query(sql), verification)
            .bind(("expected_version", verification.version()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::from_write(e, TABLE))?;
        let rows: Vec<VersionRow> = result.take(0).map_err(DbError::from)?;

        if rows.is_empty() {
            return Err(missing_or_stale(
                &self.db,
                TABLE,
                verification.tenant_id(),
                verification.id(),
            )
            .await
            .into());
        }

        let mut record = VerificationRecord::from(verification);
        record.version = verification.version() + 1;
        IdentityVerification::try_from(record)
    }

    async fn latest_for_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> TelemedResult<Option<IdentityVerification>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM identity_verification \
                 WHERE tenant_id = $tenant_id AND user_id = $user_id \
                 ORDER BY created_at DESC LIMIT 1",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<VerificationRow> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .next()
            .map(VerificationRow::try_into_verification)
            .transpose()
            .map_err(Into::into)
    }

    async fn list_lapsed(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
        limit: u64,
    ) -> TelemedResult<Vec<IdentityVerification>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM identity_verification \
                 WHERE tenant_id = $tenant_id AND status != 'Expired' \
                 AND valid_until <= $now \
                 ORDER BY valid_until ASC LIMIT $limit",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("now", now))
            .bind(("limit", limit))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<VerificationRow> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(VerificationRow::try_into_verification)
            .collect::<Result<Vec<_>, DbError>>()
            .map_err(Into::into)
    }
}
