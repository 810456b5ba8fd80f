//! SurrealDB repository implementations.

mod consent;
mod encounter;
mod identity;
mod recording;
mod session;

pub use consent::SurrealConsentRepository;
pub use encounter::SurrealFirstEncounterExceptionRepository;
pub use identity::SurrealIdentityVerificationRepository;
pub use recording::SurrealRecordingRepository;
pub use session::SurrealSessionRepository;

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

/// Projection returned by conditional updates.
#[derive(Debug, SurrealValue)]
struct VersionRow {
    version: u64,
}

#[derive(Debug, SurrealValue)]
struct IdRow {
    #[allow(dead_code)]
    record_id: String,
}

fn parse_uuid(entity: &str, field: &str, value: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|e| DbError::decode(entity, format!("invalid {field} UUID: {e}")))
}

fn parse_opt_uuid(entity: &str, field: &str, value: Option<&str>) -> Result<Option<Uuid>, DbError> {
    value.map(|v| parse_uuid(entity, field, v)).transpose()
}

/// Explain why a conditional update matched nothing.
///
/// The record is either gone (or owned by another tenant) or its stored
/// version moved on since the caller read it.
async fn missing_or_stale<C: Connection>(
    db: &Surreal<C>,
    table: &'static str,
    tenant_id: Uuid,
    id: Uuid,
) -> DbError {
    let lookup = async {
        let mut result = db
            .query(
                "SELECT meta::id(id) AS record_id FROM type::record($table, $id) \
                 WHERE tenant_id = $tenant_id",
            )
            .bind(("table", table))
            .bind(("id", id.to_string()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await?;
        let rows: Vec<IdRow> = result.take(0)?;
        Ok::<bool, DbError>(!rows.is_empty())
    };

    match lookup.await {
        Ok(true) => DbError::Stale {
            entity: table.into(),
            id: id.to_string(),
        },
        Ok(false) => DbError::NotFound {
            entity: table.into(),
            id: id.to_string(),
        },
        Err(err) => err,
    }
}

/// Total number of rows matching a tenant-scoped `WHERE` clause.
async fn count_where<C: Connection>(
    db: &Surreal<C>,
    table: &'static str,
    filter: &'static str,
    binds: Vec<(&'static str, String)>,
) -> Result<u64, DbError> {
    let mut query = db
        .query(format!(
            "SELECT count() AS total FROM {table} WHERE {filter} GROUP ALL"
        ));
    for bind in binds {
        query = query.bind(bind);
    }
    let mut result = query.await?;
    let rows: Vec<CountRow> = result.take(0)?;
    Ok(rows.first().map(|r| r.total).unwrap_or(0))
}
