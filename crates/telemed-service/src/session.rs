//! Session lifecycle manager: owns the telemedicine session state machine
//! and coordinates the video provider, the first-encounter policy, consent
//! checks and recording ingestion.

use chrono::{DateTime, Duration, Utc};
use telemed_core::error::{TelemedError, TelemedResult};
use telemed_core::events::{DomainEvent, EventPublisher};
use telemed_core::models::consent::TelemedicineConsent;
use telemed_core::models::session::{NewSession, SessionStatus, TelemedicineSession};
use telemed_core::provider::VideoProvider;
use telemed_core::repository::{
    ConsentRepository, FirstEncounterExceptionRepository, Pagination, RecordingRepository,
    SessionRepository,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::TelemedConfig;
use crate::external::{bounded, emit};
use crate::first_encounter::FirstEncounterPolicyEngine;
use crate::retention::{BeginRecording, RecordingRetentionEngine};

const VIDEO: &str = "video_provider";

/// How many of a patient's active consents are scanned for one that
/// authorizes recording.
const CONSENT_SCAN_LIMIT: u64 = 50;

/// Input for [`SessionLifecycleManager::create_session`].
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub appointment_id: Uuid,
    pub clinic_id: Uuid,
    pub provider_id: Uuid,
    pub patient_id: Uuid,
    /// Requires a valid consent from the patient.
    pub recording_enabled: bool,
    /// Documented reason to hold a first encounter remotely.
    pub first_encounter_justification: Option<String>,
}

/// Which side of the consultation is joining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantRole {
    Provider,
    Patient,
}

/// What a participant needs to enter the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinCredentials {
    pub room_url: String,
    pub token: String,
    pub token_expires_at: DateTime<Utc>,
}

/// Telemedicine session lifecycle manager.
///
/// Generic over repository and provider implementations so that the
/// service layer has no dependency on the database crate.
pub struct SessionLifecycleManager<S, C, X, R, V, E>
where
    S: SessionRepository,
    C: ConsentRepository,
    X: FirstEncounterExceptionRepository,
    R: RecordingRepository,
    V: VideoProvider,
    E: EventPublisher,
{
    sessions: S,
    consents: C,
    policy: FirstEncounterPolicyEngine<S, X, E>,
    retention: RecordingRetentionEngine<R, C, E>,
    video: V,
    publisher: E,
    config: TelemedConfig,
}

impl<S, C, X, R, V, E> SessionLifecycleManager<S, C, X, R, V, E>
where
    S: SessionRepository,
    C: ConsentRepository,
    X: FirstEncounterExceptionRepository,
    R: RecordingRepository,
    V: VideoProvider,
    E: EventPublisher,
{
    /// Fails with `Validation` when `config` is unusable, e.g. encrypted
    /// recordings without a key id.
    pub fn new(
        sessions: S,
        consents: C,
        policy: FirstEncounterPolicyEngine<S, X, E>,
        retention: RecordingRetentionEngine<R, C, E>,
        video: V,
        publisher: E,
        config: TelemedConfig,
    ) -> TelemedResult<Self> {
        config.validate()?;
        Ok(Self {
            sessions,
            consents,
            policy,
            retention,
            video,
            publisher,
            config,
        })
    }

    /// Schedule a session for an appointment and allocate its room.
    pub async fn create_session(
        &self,
        tenant_id: Uuid,
        request: CreateSessionRequest,
    ) -> TelemedResult<TelemedicineSession> {
        if self
            .sessions
            .get_active_by_appointment(tenant_id, request.appointment_id)
            .await?
            .is_some()
        {
            return Err(TelemedError::AlreadyExists {
                entity: "telemedicine_session".into(),
            });
        }

        let decision = self
            .policy
            .evaluate(
                tenant_id,
                request.patient_id,
                request.provider_id,
                request.first_encounter_justification.as_deref(),
            )
            .await?;
        if !decision.can_proceed_with_telemedicine {
            return Err(TelemedError::PolicyViolation {
                reason: decision
                    .message
                    .unwrap_or_else(|| "telemedicine is not permitted".into()),
            });
        }

        let now = Utc::now();
        let recording_consent = if request.recording_enabled {
            Some(
                self.recording_consent(tenant_id, request.patient_id, request.appointment_id, now)
                    .await?,
            )
        } else {
            None
        };

        let session_id = Uuid::new_v4();
        let room_name = format!("telemed-{}", session_id.simple());
        let room = bounded(
            VIDEO,
            self.config.external_call_timeout,
            self.video
                .create_room(&room_name, self.config.room_expiration_hours),
        )
        .await?;

        let persisted = async {
            let mut session = TelemedicineSession::schedule(
                NewSession {
                    id: session_id,
                    tenant_id,
                    appointment_id: request.appointment_id,
                    clinic_id: request.clinic_id,
                    provider_id: request.provider_id,
                    patient_id: request.patient_id,
                    room,
                    recording_enabled: request.recording_enabled,
                },
                now,
            )?;
            if let Some(consent) = &recording_consent {
                session.mark_consented(consent.id(), now)?;
            }
            self.sessions.create(&session).await
        }
        .await;

        let session = match persisted {
            Ok(session) => session,
            Err(err) => {
                self.teardown_room(tenant_id, session_id, &room_name).await;
                return Err(err);
            }
        };

        info!(
            %tenant_id,
            session_id = %session.id(),
            appointment_id = %session.appointment_id(),
            first_encounter = decision.is_first_appointment,
            "Telemedicine session scheduled"
        );
        emit(
            &self.publisher,
            tenant_id,
            DomainEvent::SessionCreated {
                session_id: session.id(),
                appointment_id: session.appointment_id(),
                provider_id: session.provider_id(),
                patient_id: session.patient_id(),
            },
        )
        .await;
        if let Some(consent_id) = session.consent_id() {
            emit(
                &self.publisher,
                tenant_id,
                DomainEvent::SessionConsentAttached {
                    session_id: session.id(),
                    consent_id,
                },
            )
            .await;
        }

        Ok(session)
    }

    /// The patient's newest current consent that accepts recording,
    /// preferring one given for this appointment.
    async fn recording_consent(
        &self,
        tenant_id: Uuid,
        patient_id: Uuid,
        appointment_id: Uuid,
        now: DateTime<Utc>,
    ) -> TelemedResult<TelemedicineConsent> {
        if !self
            .consents
            .has_valid_consent(tenant_id, patient_id, now)
            .await?
        {
            return Err(TelemedError::PolicyViolation {
                reason: "recording requires a valid patient consent".into(),
            });
        }

        let page = self
            .consents
            .list_by_patient(
                tenant_id,
                patient_id,
                true,
                Pagination {
                    offset: 0,
                    limit: CONSENT_SCAN_LIMIT,
                },
            )
            .await?;
        let mut authorizing: Vec<TelemedicineConsent> = page
            .items
            .into_iter()
            .filter(|c| c.authorizes_recording(now))
            .collect();
        if authorizing.is_empty() {
            return Err(TelemedError::PolicyViolation {
                reason: "the patient's consent does not accept recording".into(),
            });
        }
        let preferred = authorizing
            .iter()
            .position(|c| c.appointment_id() == Some(appointment_id))
            .unwrap_or(0);
        Ok(authorizing.swap_remove(preferred))
    }

    /// Issue room credentials to one of the session's participants.
    ///
    /// Identity and consent gating is the caller's job; see
    /// `IdentityVerificationRegistry::is_user_verified` and
    /// `ConsentLedger::has_valid_consent`.
    pub async fn join_session(
        &self,
        tenant_id: Uuid,
        session_id: Uuid,
        user_id: Uuid,
        user_name: &str,
        role: ParticipantRole,
    ) -> TelemedResult<JoinCredentials> {
        let session = self.sessions.get_by_id(tenant_id, session_id).await?;
        if !session.is_active() {
            return Err(TelemedError::invalid_transition(
                "telemedicine_session",
                session.status(),
                "joined",
            ));
        }

        let expected = match role {
            ParticipantRole::Provider => session.provider_id(),
            ParticipantRole::Patient => session.patient_id(),
        };
        if user_id != expected {
            return Err(TelemedError::PolicyViolation {
                reason: format!("user {user_id} is not a participant of session {session_id}"),
            });
        }

        let minutes = self.config.participant_token_minutes;
        let token = bounded(
            VIDEO,
            self.config.external_call_timeout,
            self.video
                .generate_token(&session.room().name, &user_id.to_string(), user_name, minutes),
        )
        .await?;

        info!(%tenant_id, %session_id, %user_id, ?role, "Join token issued");
        Ok(JoinCredentials {
            room_url: session.room().url.clone(),
            token,
            token_expires_at: Utc::now() + Duration::minutes(i64::from(minutes)),
        })
    }

    pub async fn start_session(
        &self,
        tenant_id: Uuid,
        session_id: Uuid,
    ) -> TelemedResult<TelemedicineSession> {
        let mut session = self.sessions.get_by_id(tenant_id, session_id).await?;
        let from = session.status();
        session.start(Utc::now())?;
        self.persist_transition(session, from).await
    }

    /// Complete an in-progress session.
    ///
    /// The completion is persisted first. Fetching and ingesting the
    /// provider's recording afterwards is best effort and never fails the
    /// call.
    pub async fn complete_session(
        &self,
        tenant_id: Uuid,
        session_id: Uuid,
        notes: Option<String>,
    ) -> TelemedResult<TelemedicineSession> {
        let mut session = self.sessions.get_by_id(tenant_id, session_id).await?;
        let from = session.status();
        session.complete(notes, Utc::now())?;
        let session = self.persist_transition(session, from).await?;

        Ok(self.ingest_recording(session).await)
    }

    async fn ingest_recording(&self, session: TelemedicineSession) -> TelemedicineSession {
        let tenant_id = session.tenant_id();
        let session_id = session.id();

        let url = match bounded(
            VIDEO,
            self.config.external_call_timeout,
            self.video.get_recording_url(&session.room().name),
        )
        .await
        {
            Ok(Some(url)) => url,
            Ok(None) => {
                debug!(%tenant_id, %session_id, "No recording for session");
                return session;
            }
            Err(err) => {
                warn!(%tenant_id, %session_id, error = %err, "Recording lookup failed");
                return session;
            }
        };

        let mut updated = session.clone();
        let stored = match updated.attach_recording_url(url, Utc::now()) {
            Ok(()) => self.sessions.update(&updated).await,
            Err(err) => Err(err),
        };
        let session = match stored {
            Ok(stored) => stored,
            Err(err) => {
                warn!(%tenant_id, %session_id, error = %err, "Could not store recording url");
                session
            }
        };

        let Some(consent_id) = session.consent_id() else {
            warn!(
                %tenant_id,
                %session_id,
                "Session has no consent, recording url kept but not ingested"
            );
            return session;
        };

        let request = BeginRecording {
            session_id,
            consent_id,
            ..Default::default()
        };
        if let Err(err) = self.retention.begin_recording(tenant_id, request).await {
            warn!(%tenant_id, %session_id, error = %err, "Recording ingestion failed");
        }

        session
    }

    pub async fn cancel_session(
        &self,
        tenant_id: Uuid,
        session_id: Uuid,
        reason: Option<String>,
    ) -> TelemedResult<TelemedicineSession> {
        let mut session = self.sessions.get_by_id(tenant_id, session_id).await?;
        let from = session.status();
        session.cancel(reason, Utc::now())?;
        let session = self.persist_transition(session, from).await?;

        self.teardown_room(tenant_id, session_id, &session.room().name)
            .await;
        Ok(session)
    }

    pub async fn mark_failed(
        &self,
        tenant_id: Uuid,
        session_id: Uuid,
        error: Option<String>,
    ) -> TelemedResult<TelemedicineSession> {
        let mut session = self.sessions.get_by_id(tenant_id, session_id).await?;
        let from = session.status();
        session.fail(error, Utc::now())?;
        let session = self.persist_transition(session, from).await?;

        self.teardown_room(tenant_id, session_id, &session.room().name)
            .await;
        Ok(session)
    }

    pub async fn get_session(
        &self,
        tenant_id: Uuid,
        session_id: Uuid,
    ) -> TelemedResult<TelemedicineSession> {
        self.sessions.get_by_id(tenant_id, session_id).await
    }

    async fn persist_transition(
        &self,
        session: TelemedicineSession,
        from: SessionStatus,
    ) -> TelemedResult<TelemedicineSession> {
        let session = self.sessions.update(&session).await?;
        let tenant_id = session.tenant_id();

        info!(
            %tenant_id,
            session_id = %session.id(),
            %from,
            to = %session.status(),
            "Session status changed"
        );
        emit(
            &self.publisher,
            tenant_id,
            DomainEvent::SessionStatusChanged {
                session_id: session.id(),
                from,
                to: session.status(),
                reason: session.status_reason().map(str::to_string),
            },
        )
        .await;

        Ok(session)
    }

    async fn teardown_room(&self, tenant_id: Uuid, session_id: Uuid, room_name: &str) {
        let result = bounded(
            VIDEO,
            self.config.external_call_timeout,
            self.video.delete_room(room_name),
        )
        .await;
        if let Err(err) = result {
            warn!(%tenant_id, %session_id, room_name, error = %err, "Room teardown failed");
        }
    }
}
