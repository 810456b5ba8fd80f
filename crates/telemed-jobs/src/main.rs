//! Telemedicine maintenance jobs.
//!
//! # Environment Variables
//! - `TELEMED_DB_URL`, `TELEMED_DB_NS`, `TELEMED_DB_NAME`,
//!   `TELEMED_DB_USER`, `TELEMED_DB_PASS`: SurrealDB connection
//! - `TELEMED_REGISTRY_URL`, `TELEMED_REGISTRY_KEY`: registry service
//! - `TELEMED_RECORDING_KEY`: encryption key id for recordings
//! - `RUST_LOG`: log filter (default `telemed=info`)

mod cli;
mod jobs;

use anyhow::Context;
use clap::Parser;
use telemed_core::events::TracingEventPublisher;
use telemed_db::DbManager;
use telemed_providers::HttpRegistryValidator;
use telemed_service::{IdentityVerificationRegistry, RecordingRetentionEngine};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("telemed=info".parse()?))
        .json()
        .init();

    let cli = Cli::parse();
    let db = DbManager::connect(&cli.db.to_config())
        .await
        .context("connecting to SurrealDB")?;
    let config = cli.telemed_config();

    match cli.command {
        Command::Migrate => {
            db.migrate().await.context("applying migrations")?;
            tracing::info!("Migrations applied");
        }
        Command::ExpireVerifications { tenant, limit } => {
            let registry = IdentityVerificationRegistry::new(
                db.verifications(),
                HttpRegistryValidator::new(cli.registry.to_config())?,
                TracingEventPublisher,
                config,
            );
            let expired = jobs::expire_verifications(&registry, tenant, limit).await?;
            tracing::info!(%tenant, expired, "Verification sweep finished");
        }
        Command::ValidateVerification { tenant, id } => {
            let registry = IdentityVerificationRegistry::new(
                db.verifications(),
                HttpRegistryValidator::new(cli.registry.to_config())?,
                TracingEventPublisher,
                config,
            );
            let verification = registry.validate_against_registry(tenant, id).await?;
            tracing::info!(
                %tenant,
                verification_id = %id,
                status = verification.status().as_str(),
                "Registry validation finished"
            );
        }
        Command::PurgeRecordings {
            tenant,
            operator,
            limit,
            dry_run,
        } => {
            let retention = RecordingRetentionEngine::new(
                db.recordings(),
                db.consents(),
                TracingEventPublisher,
                config,
            );
            let report =
                jobs::purge_recordings(&retention, tenant, operator, limit, dry_run).await?;
            tracing::info!(
                %tenant,
                dry_run,
                eligible = report.eligible,
                deleted = report.deleted,
                failed = report.failed,
                "Recording purge finished"
            );
        }
    }

    Ok(())
}
