//! Shared fixtures: in-memory SurrealDB, fake external services and a
//! collecting event publisher.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use telemed_core::error::{TelemedError, TelemedResult};
use telemed_core::events::{EventEnvelope, EventPublisher};
use telemed_core::models::consent::{NewConsent, TelemedicineConsent};
use telemed_core::models::session::VideoRoom;
use telemed_core::provider::{
    LicenseValidation, NationalIdValidation, RegistryValidator, VideoProvider,
};
use telemed_db::repository::{
    SurrealConsentRepository, SurrealFirstEncounterExceptionRepository,
    SurrealIdentityVerificationRepository, SurrealRecordingRepository, SurrealSessionRepository,
};
use telemed_service::{
    ConsentLedger, CreateSessionRequest, FirstEncounterPolicyEngine,
    IdentityVerificationRegistry, RecordingRetentionEngine, SessionLifecycleManager,
    TelemedConfig,
};
use uuid::Uuid;

// -----------------------------------------------------------------------
// Fake video provider
// -----------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct VideoState {
    pub created: Vec<String>,
    pub deleted: Vec<String>,
    pub tokens: Vec<(String, String)>,
    pub recording_url: Option<String>,
    pub fail_create: bool,
    pub fail_recording_lookup: bool,
    pub create_delay: Option<Duration>,
}

#[derive(Clone, Default)]
pub struct FakeVideoProvider {
    pub state: Arc<Mutex<VideoState>>,
}

impl FakeVideoProvider {
    pub fn with<T>(&self, f: impl FnOnce(&mut VideoState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }
}

impl VideoProvider for FakeVideoProvider {
    async fn create_room(&self, name: &str, expiration_hours: u32) -> TelemedResult<VideoRoom> {
        let (fail, delay) = self.with(|s| (s.fail_create, s.create_delay));
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(TelemedError::unavailable("fake_video", "room service down"));
        }
        self.with(|s| s.created.push(name.to_string()));
        Ok(VideoRoom {
            name: name.to_string(),
            url: format!("https://video.test/{name}"),
            expires_at: Utc::now() + chrono::Duration::hours(i64::from(expiration_hours)),
        })
    }

    async fn generate_token(
        &self,
        room_name: &str,
        user_id: &str,
        _user_name: &str,
        expiration_minutes: u32,
    ) -> TelemedResult<String> {
        self.with(|s| s.tokens.push((room_name.to_string(), user_id.to_string())));
        Ok(format!("token:{room_name}:{user_id}:{expiration_minutes}"))
    }

    async fn delete_room(&self, room_name: &str) -> TelemedResult<()> {
        self.with(|s| s.deleted.push(room_name.to_string()));
        Ok(())
    }

    async fn get_recording_url(&self, _room_name: &str) -> TelemedResult<Option<String>> {
        let (fail, url) = self.with(|s| (s.fail_recording_lookup, s.recording_url.clone()));
        if fail {
            return Err(TelemedError::unavailable("fake_video", "recording api down"));
        }
        Ok(url)
    }
}

// -----------------------------------------------------------------------
// Fake registry
// -----------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RegistryState {
    pub license: LicenseValidation,
    pub national_id: NationalIdValidation,
    pub unreachable: bool,
}

#[derive(Clone, Default)]
pub struct FakeRegistry {
    pub state: Arc<Mutex<RegistryState>>,
}

impl FakeRegistry {
    pub fn with<T>(&self, f: impl FnOnce(&mut RegistryState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }
}

impl RegistryValidator for FakeRegistry {
    async fn validate_license(
        &self,
        _number: &str,
        _jurisdiction: &str,
    ) -> TelemedResult<LicenseValidation> {
        let (down, verdict) = self.with(|s| (s.unreachable, s.license.clone()));
        if down {
            return Err(TelemedError::unavailable("fake_registry", "connection refused"));
        }
        Ok(verdict)
    }

    async fn validate_national_id(&self, _national_id: &str) -> TelemedResult<NationalIdValidation> {
        let (down, verdict) = self.with(|s| (s.unreachable, s.national_id.clone()));
        if down {
            return Err(TelemedError::unavailable("fake_registry", "connection refused"));
        }
        Ok(verdict)
    }
}

// -----------------------------------------------------------------------
// Collecting publisher
// -----------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct CollectingPublisher {
    pub events: Arc<Mutex<Vec<EventEnvelope>>>,
}

impl CollectingPublisher {
    pub fn names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event.name())
            .collect()
    }
}

impl EventPublisher for CollectingPublisher {
    async fn publish(&self, envelope: EventEnvelope) -> TelemedResult<()> {
        self.events.lock().unwrap().push(envelope);
        Ok(())
    }
}

// -----------------------------------------------------------------------
// Harness
// -----------------------------------------------------------------------

pub type Sessions = SurrealSessionRepository<Db>;
pub type Consents = SurrealConsentRepository<Db>;
pub type Exceptions = SurrealFirstEncounterExceptionRepository<Db>;
pub type Recordings = SurrealRecordingRepository<Db>;
pub type Verifications = SurrealIdentityVerificationRepository<Db>;

pub type Manager = SessionLifecycleManager<
    Sessions,
    Consents,
    Exceptions,
    Recordings,
    FakeVideoProvider,
    CollectingPublisher,
>;

pub struct Harness {
    pub tenant_id: Uuid,
    pub sessions: Sessions,
    pub consents: Consents,
    pub exceptions: Exceptions,
    pub recordings: Recordings,
    pub verifications: Verifications,
    pub manager: Manager,
    pub ledger: ConsentLedger<Consents, Sessions, CollectingPublisher>,
    pub identity: IdentityVerificationRegistry<Verifications, FakeRegistry, CollectingPublisher>,
    pub retention: RecordingRetentionEngine<Recordings, Consents, CollectingPublisher>,
    pub policy: FirstEncounterPolicyEngine<Sessions, Exceptions, CollectingPublisher>,
    pub video: FakeVideoProvider,
    pub registry: FakeRegistry,
    pub events: CollectingPublisher,
}

pub fn test_config() -> TelemedConfig {
    TelemedConfig {
        external_call_timeout: Duration::from_millis(200),
        recording_encryption_key_id: Some("kms-test-key".into()),
        ..TelemedConfig::default()
    }
}

pub async fn setup() -> Harness {
    let db: Surreal<Db> = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    telemed_db::run_migrations(&db).await.unwrap();

    let config = test_config();
    let sessions = SurrealSessionRepository::new(db.clone());
    let consents = SurrealConsentRepository::new(db.clone());
    let exceptions = SurrealFirstEncounterExceptionRepository::new(db.clone());
    let recordings = SurrealRecordingRepository::new(db.clone());
    let verifications = SurrealIdentityVerificationRepository::new(db);
    let video = FakeVideoProvider::default();
    let registry = FakeRegistry::default();
    let events = CollectingPublisher::default();

    let retention = || {
        RecordingRetentionEngine::new(
            recordings.clone(),
            consents.clone(),
            events.clone(),
            config.clone(),
        )
    };
    let policy = || {
        FirstEncounterPolicyEngine::new(sessions.clone(), exceptions.clone(), events.clone())
    };

    let manager = SessionLifecycleManager::new(
        sessions.clone(),
        consents.clone(),
        policy(),
        retention(),
        video.clone(),
        events.clone(),
        config.clone(),
    )
    .unwrap();
    let standalone_retention = retention();
    let standalone_policy = policy();
    let ledger = ConsentLedger::new(consents.clone(), sessions.clone(), events.clone());
    let identity = IdentityVerificationRegistry::new(
        verifications.clone(),
        registry.clone(),
        events.clone(),
        config,
    );

    Harness {
        tenant_id: Uuid::new_v4(),
        sessions,
        consents,
        exceptions,
        recordings,
        verifications,
        manager,
        ledger,
        identity,
        retention: standalone_retention,
        policy: standalone_policy,
        video,
        registry,
        events,
    }
}

impl Harness {
    /// A second manager over the same store, built from `config`.
    pub fn manager_with(&self, config: TelemedConfig) -> TelemedResult<Manager> {
        SessionLifecycleManager::new(
            self.sessions.clone(),
            self.consents.clone(),
            FirstEncounterPolicyEngine::new(
                self.sessions.clone(),
                self.exceptions.clone(),
                self.events.clone(),
            ),
            RecordingRetentionEngine::new(
                self.recordings.clone(),
                self.consents.clone(),
                self.events.clone(),
                config.clone(),
            ),
            self.video.clone(),
            self.events.clone(),
            config,
        )
    }

    pub fn consent_input(&self, patient_id: Uuid, accepts_recording: bool) -> NewConsent {
        NewConsent {
            tenant_id: self.tenant_id,
            patient_id,
            appointment_id: None,
            accepts_recording,
            accepts_data_sharing: false,
            ip_address: "198.51.100.23".into(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64)".into(),
            consent_text: "I consent to a telemedicine consultation.".into(),
            digital_signature: None,
        }
    }

    pub async fn record_consent(&self, patient_id: Uuid, accepts_recording: bool) -> TelemedicineConsent {
        self.ledger
            .record_consent(self.consent_input(patient_id, accepts_recording))
            .await
            .unwrap()
    }

    /// A justified first-encounter request for a fresh appointment.
    pub fn session_request(&self, patient_id: Uuid, provider_id: Uuid) -> CreateSessionRequest {
        CreateSessionRequest {
            appointment_id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            provider_id,
            patient_id,
            recording_enabled: false,
            first_encounter_justification: Some("patient is abroad".into()),
        }
    }
}
