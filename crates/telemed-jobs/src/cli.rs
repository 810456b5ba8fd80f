use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use telemed_db::DbConfig;
use telemed_providers::RegistryConfig;
use telemed_service::TelemedConfig;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "telemed-jobs")]
#[command(about = "Telemedicine compliance maintenance jobs")]
pub struct Cli {
    #[command(flatten)]
    pub db: DbArgs,

    #[command(flatten)]
    pub registry: RegistryArgs,

    /// KMS key id for recordings stored encrypted
    #[arg(long = "recording-key", env = "TELEMED_RECORDING_KEY", global = true)]
    pub recording_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct DbArgs {
    #[arg(id = "db_url", long = "db-url", env = "TELEMED_DB_URL", default_value = "127.0.0.1:8000")]
    pub url: String,
    #[arg(long = "db-ns", env = "TELEMED_DB_NS", default_value = "telemed")]
    pub namespace: String,
    #[arg(long = "db-name", env = "TELEMED_DB_NAME", default_value = "main")]
    pub database: String,
    #[arg(long = "db-user", env = "TELEMED_DB_USER", default_value = "root")]
    pub username: String,
    #[arg(long = "db-pass", env = "TELEMED_DB_PASS", default_value = "root", hide_env_values = true)]
    pub password: String,
}

impl Cli {
    pub fn telemed_config(&self) -> TelemedConfig {
        TelemedConfig {
            recording_encryption_key_id: self.recording_key.clone(),
            ..TelemedConfig::default()
        }
    }
}

impl DbArgs {
    pub fn to_config(&self) -> DbConfig {
        DbConfig {
            url: self.url.clone(),
            namespace: self.namespace.clone(),
            database: self.database.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

#[derive(Debug, Args)]
pub struct RegistryArgs {
    #[arg(id = "registry_url", long = "registry-url", env = "TELEMED_REGISTRY_URL", default_value = "http://127.0.0.1:8090")]
    pub url: String,
    #[arg(long = "registry-key", env = "TELEMED_REGISTRY_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
    /// Per-request timeout in seconds.
    #[arg(long = "registry-timeout", default_value_t = 10)]
    pub timeout_secs: u64,
}

impl RegistryArgs {
    pub fn to_config(&self) -> RegistryConfig {
        RegistryConfig {
            base_url: self.url.clone(),
            api_key: self.api_key.clone(),
            request_timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Apply pending schema migrations
    Migrate,
    /// Mark identity verifications past their validity window as expired
    ExpireVerifications {
        #[arg(long)]
        tenant: Uuid,
        #[arg(long, default_value_t = 500)]
        limit: u64,
    },
    /// Approve or reject a pending verification from the registry's verdict
    ValidateVerification {
        #[arg(long)]
        tenant: Uuid,
        #[arg(long)]
        id: Uuid,
    },
    /// Soft-delete recordings whose retention window has ended
    PurgeRecordings {
        #[arg(long)]
        tenant: Uuid,
        /// User id recorded as the deleter in the audit trail
        #[arg(long)]
        operator: Uuid,
        #[arg(long, default_value_t = 500)]
        limit: u64,
        /// List what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purge_parses_flags() {
        let tenant = Uuid::new_v4();
        let operator = Uuid::new_v4();
        let cli = Cli::try_parse_from([
            "telemed-jobs",
            "--db-url",
            "db.internal:8000",
            "purge-recordings",
            "--tenant",
            &tenant.to_string(),
            "--operator",
            &operator.to_string(),
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(cli.db.to_config().url, "db.internal:8000");
        match cli.command {
            Command::PurgeRecordings {
                tenant: t,
                operator: o,
                limit,
                dry_run,
            } => {
                assert_eq!(t, tenant);
                assert_eq!(o, operator);
                assert_eq!(limit, 500);
                assert!(dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn recording_key_reaches_the_service_config() {
        let cli = Cli::try_parse_from(["telemed-jobs", "migrate", "--recording-key", "kms-7"]).unwrap();
        let config = cli.telemed_config();
        assert_eq!(config.recording_encryption_key_id.as_deref(), Some("kms-7"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn tenant_must_be_a_uuid() {
        let result = Cli::try_parse_from([
            "telemed-jobs",
            "expire-verifications",
            "--tenant",
            "clinic-7",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn registry_timeout_is_seconds() {
        let cli = Cli::try_parse_from(["telemed-jobs", "--registry-timeout", "3", "migrate"]).unwrap();
        assert_eq!(cli.registry.to_config().request_timeout, Duration::from_secs(3));
    }
}
