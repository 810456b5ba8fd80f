//! SurrealDB connection management.

use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use tracing::info;

use crate::error::DbError;
use crate::repository::{
    SurrealConsentRepository, SurrealFirstEncounterExceptionRepository,
    SurrealIdentityVerificationRepository, SurrealRecordingRepository, SurrealSessionRepository,
};
use crate::schema::run_migrations;

/// Where the telemedicine records live.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// WebSocket address, e.g. `127.0.0.1:8000`.
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "127.0.0.1:8000".into(),
            namespace: "telemed".into(),
            database: "main".into(),
            username: "root".into(),
            password: "root".into(),
        }
    }
}

/// Live WebSocket connection plus factories for the repositories that
/// share it.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Client>,
}

impl DbManager {
    /// Sign in as root and select the configured namespace and database.
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        info!(
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
            "Connecting to telemedicine store"
        );

        let db = Surreal::new::<Ws>(&config.url).await?;
        db.signin(Root {
            username: config.username.clone(),
            password: config.password.clone(),
        })
        .await?;
        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;

        info!("Telemedicine store connected");
        Ok(Self { db })
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> Result<(), DbError> {
        run_migrations(&self.db).await
    }

    pub fn client(&self) -> &Surreal<Client> {
        &self.db
    }

    pub fn sessions(&self) -> SurrealSessionRepository<Client> {
        SurrealSessionRepository::new(self.db.clone())
    }

    pub fn consents(&self) -> SurrealConsentRepository<Client> {
        SurrealConsentRepository::new(self.db.clone())
    }

    pub fn verifications(&self) -> SurrealIdentityVerificationRepository<Client> {
        SurrealIdentityVerificationRepository::new(self.db.clone())
    }

    pub fn recordings(&self) -> SurrealRecordingRepository<Client> {
        SurrealRecordingRepository::new(self.db.clone())
    }

    pub fn encounter_exceptions(&self) -> SurrealFirstEncounterExceptionRepository<Client> {
        SurrealFirstEncounterExceptionRepository::new(self.db.clone())
    }
}
