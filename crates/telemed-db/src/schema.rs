//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode. UUIDs are stored as
//! strings. Enums are stored as strings with ASSERT constraints.
//! Every aggregate table carries a `version` column used for
//! conditional updates.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::{debug, info};

use crate::error::DbError;

// -----------------------------------------------------------------------
// Schema versions
// -----------------------------------------------------------------------

const VERSION_LEDGER_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS schema_version SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE schema_version TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE schema_version TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE schema_version TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_schema_version ON TABLE schema_version \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct AppliedVersion {
    version: u32,
}

/// One forward-only step of DDL.
struct SchemaStep {
    version: u32,
    name: &'static str,
    ddl: &'static str,
}

static STEPS: &[SchemaStep] = &[SchemaStep {
    version: 1,
    name: "telemedicine_tables",
    ddl: SCHEMA_V1,
}];

/// Steps newer than `applied`, in version order.
fn pending(applied: u32) -> impl Iterator<Item = &'static SchemaStep> {
    STEPS.iter().filter(move |step| step.version > applied)
}

// -----------------------------------------------------------------------
// Schema v1: telemedicine tables
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Telemedicine sessions (tenant-scoped)
-- active_slot holds the appointment id while the session is live and
-- closed:<session id> afterwards, so the unique index below admits at
-- most one live session per appointment.
-- =======================================================================
DEFINE TABLE telemedicine_session SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE telemedicine_session TYPE string;
DEFINE FIELD appointment_id ON TABLE telemedicine_session TYPE string;
DEFINE FIELD clinic_id ON TABLE telemedicine_session TYPE string;
DEFINE FIELD provider_id ON TABLE telemedicine_session TYPE string;
DEFINE FIELD patient_id ON TABLE telemedicine_session TYPE string;
DEFINE FIELD room_name ON TABLE telemedicine_session TYPE string;
DEFINE FIELD room_url ON TABLE telemedicine_session TYPE string;
DEFINE FIELD room_expires_at ON TABLE telemedicine_session TYPE datetime;
DEFINE FIELD status ON TABLE telemedicine_session TYPE string \
    ASSERT $value IN ['Scheduled', 'InProgress', 'Completed', \
    'Cancelled', 'Failed'];
DEFINE FIELD started_at ON TABLE telemedicine_session \
    TYPE option<datetime>;
DEFINE FIELD ended_at ON TABLE telemedicine_session TYPE option<datetime>;
DEFINE FIELD recording_enabled ON TABLE telemedicine_session TYPE bool \
    DEFAULT false;
DEFINE FIELD consent_id ON TABLE telemedicine_session TYPE option<string>;
DEFINE FIELD recording_url ON TABLE telemedicine_session \
    TYPE option<string>;
DEFINE FIELD notes ON TABLE telemedicine_session TYPE option<string>;
DEFINE FIELD status_reason ON TABLE telemedicine_session \
    TYPE option<string>;
DEFINE FIELD active_slot ON TABLE telemedicine_session TYPE string;
DEFINE FIELD version ON TABLE telemedicine_session TYPE int;
DEFINE FIELD created_at ON TABLE telemedicine_session TYPE datetime;
DEFINE FIELD updated_at ON TABLE telemedicine_session TYPE datetime;
DEFINE INDEX idx_session_active_slot ON TABLE telemedicine_session \
    COLUMNS tenant_id, active_slot UNIQUE;
DEFINE INDEX idx_session_pair ON TABLE telemedicine_session \
    COLUMNS tenant_id, patient_id, provider_id;

-- =======================================================================
-- Consents (tenant-scoped, never deleted)
-- =======================================================================
DEFINE TABLE telemedicine_consent SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE telemedicine_consent TYPE string;
DEFINE FIELD patient_id ON TABLE telemedicine_consent TYPE string;
DEFINE FIELD appointment_id ON TABLE telemedicine_consent \
    TYPE option<string>;
DEFINE FIELD consented_at ON TABLE telemedicine_consent TYPE datetime;
DEFINE FIELD consent_text ON TABLE telemedicine_consent TYPE string;
DEFINE FIELD consent_text_sha256 ON TABLE telemedicine_consent TYPE string;
DEFINE FIELD ip_address ON TABLE telemedicine_consent TYPE string;
DEFINE FIELD user_agent ON TABLE telemedicine_consent TYPE string;
DEFINE FIELD accepts_recording ON TABLE telemedicine_consent TYPE bool;
DEFINE FIELD accepts_data_sharing ON TABLE telemedicine_consent TYPE bool;
DEFINE FIELD digital_signature ON TABLE telemedicine_consent \
    TYPE option<string>;
DEFINE FIELD is_active ON TABLE telemedicine_consent TYPE bool;
DEFINE FIELD revoked_at ON TABLE telemedicine_consent \
    TYPE option<datetime>;
DEFINE FIELD revocation_reason ON TABLE telemedicine_consent \
    TYPE option<string>;
DEFINE FIELD version ON TABLE telemedicine_consent TYPE int;
DEFINE FIELD created_at ON TABLE telemedicine_consent TYPE datetime;
DEFINE FIELD updated_at ON TABLE telemedicine_consent TYPE datetime;
DEFINE INDEX idx_consent_patient ON TABLE telemedicine_consent \
    COLUMNS tenant_id, patient_id;

-- =======================================================================
-- Identity verifications (tenant-scoped)
-- =======================================================================
DEFINE TABLE identity_verification SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE identity_verification TYPE string;
DEFINE FIELD user_id ON TABLE identity_verification TYPE string;
DEFINE FIELD user_type ON TABLE identity_verification TYPE string \
    ASSERT $value IN ['Provider', 'Patient'];
DEFINE FIELD document_type ON TABLE identity_verification TYPE string;
DEFINE FIELD document_number ON TABLE identity_verification TYPE string;
DEFINE FIELD document_photo_ref ON TABLE identity_verification TYPE string;
DEFINE FIELD selfie_ref ON TABLE identity_verification TYPE option<string>;
DEFINE FIELD license_photo_ref ON TABLE identity_verification \
    TYPE option<string>;
DEFINE FIELD license_number ON TABLE identity_verification \
    TYPE option<string>;
DEFINE FIELD license_jurisdiction ON TABLE identity_verification \
    TYPE option<string>;
DEFINE FIELD status ON TABLE identity_verification TYPE string \
    ASSERT $value IN ['Pending', 'Verified', 'Rejected', 'Expired'];
DEFINE FIELD verified_at ON TABLE identity_verification \
    TYPE option<datetime>;
DEFINE FIELD verifier_id ON TABLE identity_verification \
    TYPE option<string>;
DEFINE FIELD notes ON TABLE identity_verification TYPE option<string>;
DEFINE FIELD rejection_reason ON TABLE identity_verification \
    TYPE option<string>;
DEFINE FIELD session_id ON TABLE identity_verification TYPE option<string>;
DEFINE FIELD valid_until ON TABLE identity_verification TYPE datetime;
DEFINE FIELD version ON TABLE identity_verification TYPE int;
DEFINE FIELD created_at ON TABLE identity_verification TYPE datetime;
DEFINE FIELD updated_at ON TABLE identity_verification TYPE datetime;
DEFINE INDEX idx_verification_user ON TABLE identity_verification \
    COLUMNS tenant_id, user_id;
DEFINE INDEX idx_verification_lapse ON TABLE identity_verification \
    COLUMNS tenant_id, status, valid_until;

-- =======================================================================
-- Recordings (tenant-scoped, soft-deleted)
-- =======================================================================
DEFINE TABLE telemedicine_recording SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE telemedicine_recording TYPE string;
DEFINE FIELD session_id ON TABLE telemedicine_recording TYPE string;
DEFINE FIELD storage_path ON TABLE telemedicine_recording TYPE string;
DEFINE FIELD file_format ON TABLE telemedicine_recording TYPE string;
DEFINE FIELD size_bytes ON TABLE telemedicine_recording TYPE option<int>;
DEFINE FIELD duration_seconds ON TABLE telemedicine_recording \
    TYPE option<int>;
DEFINE FIELD started_at ON TABLE telemedicine_recording \
    TYPE option<datetime>;
DEFINE FIELD completed_at ON TABLE telemedicine_recording \
    TYPE option<datetime>;
DEFINE FIELD status ON TABLE telemedicine_recording TYPE string \
    ASSERT $value IN ['Pending', 'Recording', 'Available', 'Failed', \
    'Deleted'];
DEFINE FIELD is_encrypted ON TABLE telemedicine_recording TYPE bool;
DEFINE FIELD encryption_key_id ON TABLE telemedicine_recording \
    TYPE option<string>;
DEFINE FIELD consent_id ON TABLE telemedicine_recording TYPE string;
DEFINE FIELD retention_until ON TABLE telemedicine_recording TYPE datetime;
DEFINE FIELD failure_reason ON TABLE telemedicine_recording \
    TYPE option<string>;
DEFINE FIELD is_deleted ON TABLE telemedicine_recording TYPE bool;
DEFINE FIELD deleted_at ON TABLE telemedicine_recording \
    TYPE option<datetime>;
DEFINE FIELD deleted_by ON TABLE telemedicine_recording TYPE option<string>;
DEFINE FIELD deletion_reason ON TABLE telemedicine_recording \
    TYPE option<string>;
DEFINE FIELD version ON TABLE telemedicine_recording TYPE int;
DEFINE FIELD created_at ON TABLE telemedicine_recording TYPE datetime;
DEFINE FIELD updated_at ON TABLE telemedicine_recording TYPE datetime;
DEFINE INDEX idx_recording_session ON TABLE telemedicine_recording \
    COLUMNS tenant_id, session_id;
DEFINE INDEX idx_recording_retention ON TABLE telemedicine_recording \
    COLUMNS tenant_id, is_deleted, retention_until;

-- =======================================================================
-- First-encounter exceptions (tenant-scoped, append-only)
-- =======================================================================
DEFINE TABLE first_encounter_exception SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE first_encounter_exception TYPE string;
DEFINE FIELD patient_id ON TABLE first_encounter_exception TYPE string;
DEFINE FIELD provider_id ON TABLE first_encounter_exception TYPE string;
DEFINE FIELD justification ON TABLE first_encounter_exception TYPE string;
DEFINE FIELD evaluated_at ON TABLE first_encounter_exception TYPE datetime;
DEFINE INDEX idx_exception_pair ON TABLE first_encounter_exception \
    COLUMNS tenant_id, patient_id, provider_id;
";

/// Bring the database up to the newest schema version.
///
/// Runs on every startup. The `schema_version` ledger records each
/// applied step, so a second call finds nothing pending.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(VERSION_LEDGER_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(format!("schema_version ledger: {e}")))?;

    let applied = applied_version(db).await?;
    let mut count = 0usize;
    for step in pending(applied) {
        apply(db, step).await?;
        count += 1;
    }

    if count == 0 {
        debug!(version = applied, "Telemedicine schema up to date");
    }
    Ok(())
}

async fn applied_version<C: Connection>(db: &Surreal<C>) -> Result<u32, DbError> {
    let mut response = db
        .query("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
        .await?;
    let rows: Vec<AppliedVersion> = response.take(0)?;
    Ok(rows.into_iter().next().map_or(0, |row| row.version))
}

async fn apply<C: Connection>(db: &Surreal<C>, step: &SchemaStep) -> Result<(), DbError> {
    let step_error = |stage: &str, e: String| {
        DbError::Migration(format!(
            "schema v{} ({}) {stage}: {e}",
            step.version, step.name
        ))
    };

    db.query(step.ddl)
        .await?
        .check()
        .map_err(|e| step_error("ddl", e.to_string()))?;
    db.query("CREATE schema_version SET version = $version, name = $name")
        .bind(("version", step.version))
        .bind(("name", step.name))
        .await?
        .check()
        .map_err(|e| step_error("ledger", e.to_string()))?;

    info!(version = step.version, name = step.name, "Schema step applied");
    Ok(())
}

/// Returns the raw schema DDL for version 1.
///
/// Exposed for testing with in-memory SurrealDB instances that
/// bypass the migration runner.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_v1_is_nonempty() {
        assert!(!SCHEMA_V1.is_empty());
    }

    #[test]
    fn schema_v1_defines_every_table() {
        for table in [
            "telemedicine_session",
            "telemedicine_consent",
            "identity_verification",
            "telemedicine_recording",
            "first_encounter_exception",
        ] {
            assert!(
                SCHEMA_V1.contains(&format!("DEFINE TABLE {table} SCHEMAFULL")),
                "missing table {table}"
            );
        }
    }

    #[test]
    fn steps_are_ordered() {
        assert!(STEPS.windows(2).all(|w| w[0].version < w[1].version));
    }

    #[test]
    fn pending_skips_applied_versions() {
        assert_eq!(pending(0).count(), STEPS.len());
        let newest = STEPS.last().map_or(0, |step| step.version);
        assert_eq!(pending(newest).count(), 0);
    }
}
