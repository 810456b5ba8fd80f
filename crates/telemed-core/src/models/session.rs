//! Telemedicine session aggregate.
//!
//! A session is created `Scheduled` once a video room has been allocated
//! and is only ever moved forward through its transition methods:
//!
//! ```text
//! Scheduled  -> InProgress | Cancelled | Failed
//! InProgress -> Completed  | Cancelled | Failed
//! ```
//!
//! `Completed`, `Cancelled` and `Failed` are terminal. Sessions are never
//! deleted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{TelemedError, TelemedResult, non_blank, require_text};

const ENTITY: &str = "telemedicine_session";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    Failed,
}

impl SessionStatus {
    pub const ACTIVE: [SessionStatus; 2] = [SessionStatus::Scheduled, SessionStatus::InProgress];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Cancelled | SessionStatus::Failed
        )
    }

    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Scheduled, InProgress)
                | (Scheduled, Cancelled)
                | (Scheduled, Failed)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
                | (InProgress, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "Scheduled",
            SessionStatus::InProgress => "InProgress",
            SessionStatus::Completed => "Completed",
            SessionStatus::Cancelled => "Cancelled",
            SessionStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = TelemedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Scheduled" => Ok(SessionStatus::Scheduled),
            "InProgress" => Ok(SessionStatus::InProgress),
            "Completed" => Ok(SessionStatus::Completed),
            "Cancelled" => Ok(SessionStatus::Cancelled),
            "Failed" => Ok(SessionStatus::Failed),
            other => Err(TelemedError::validation(format!(
                "unknown session status: {other}"
            ))),
        }
    }
}

/// The start/end window of a consultation.
///
/// The window is open while the session is in progress: it has a start
/// and no end.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionWindow {
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl SessionWindow {
    pub fn new(
        started_at: Option<DateTime<Utc>>,
        ended_at: Option<DateTime<Utc>>,
    ) -> TelemedResult<Self> {
        match (started_at, ended_at) {
            (Some(start), Some(end)) if end < start => Err(TelemedError::validation(
                "session window ends before it starts",
            )),
            (None, Some(_)) => Err(TelemedError::validation(
                "session window has an end but no start",
            )),
            _ => Ok(Self {
                started_at,
                ended_at,
            }),
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn is_open(&self) -> bool {
        self.started_at.is_some() && self.ended_at.is_none()
    }

    pub fn duration(&self) -> Option<Duration> {
        Some(self.ended_at? - self.started_at?)
    }

    fn open(&mut self, at: DateTime<Utc>) {
        self.started_at = Some(at);
        self.ended_at = None;
    }

    fn close(&mut self, at: DateTime<Utc>) {
        if self.is_open() {
            self.ended_at = Some(at);
        }
    }
}

/// A room allocated at the video provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoRoom {
    /// Provider-side room name (or opaque handle).
    pub name: String,
    /// URL participants use to reach the room.
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Fields required to schedule a new session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub appointment_id: Uuid,
    pub clinic_id: Uuid,
    pub provider_id: Uuid,
    pub patient_id: Uuid,
    pub room: VideoRoom,
    pub recording_enabled: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TelemedicineSession {
    id: Uuid,
    tenant_id: Uuid,
    appointment_id: Uuid,
    clinic_id: Uuid,
    provider_id: Uuid,
    patient_id: Uuid,
    room: VideoRoom,
    status: SessionStatus,
    window: SessionWindow,
    recording_enabled: bool,
    consent_id: Option<Uuid>,
    recording_url: Option<String>,
    notes: Option<String>,
    status_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl TelemedicineSession {
    /// Build a new session in `Scheduled`.
    pub fn schedule(input: NewSession, now: DateTime<Utc>) -> TelemedResult<Self> {
        require_text("room name", &input.room.name)?;
        require_text("room url", &input.room.url)?;
        if input.provider_id == input.patient_id {
            return Err(TelemedError::validation(
                "provider and patient must be different users",
            ));
        }

        Ok(Self {
            id: input.id,
            tenant_id: input.tenant_id,
            appointment_id: input.appointment_id,
            clinic_id: input.clinic_id,
            provider_id: input.provider_id,
            patient_id: input.patient_id,
            room: input.room,
            status: SessionStatus::Scheduled,
            window: SessionWindow::default(),
            recording_enabled: input.recording_enabled,
            consent_id: None,
            recording_url: None,
            notes: None,
            status_reason: None,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    pub fn appointment_id(&self) -> Uuid {
        self.appointment_id
    }

    pub fn clinic_id(&self) -> Uuid {
        self.clinic_id
    }

    pub fn provider_id(&self) -> Uuid {
        self.provider_id
    }

    pub fn patient_id(&self) -> Uuid {
        self.patient_id
    }

    pub fn room(&self) -> &VideoRoom {
        &self.room
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn window(&self) -> &SessionWindow {
        &self.window
    }

    pub fn recording_enabled(&self) -> bool {
        self.recording_enabled
    }

    /// Consent recorded against this session's appointment, if any.
    pub fn consent_id(&self) -> Option<Uuid> {
        self.consent_id
    }

    pub fn recording_url(&self) -> Option<&str> {
        self.recording_url.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// Cancellation or failure reason.
    pub fn status_reason(&self) -> Option<&str> {
        self.status_reason.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> TelemedResult<()> {
        self.transition(SessionStatus::InProgress, now)?;
        self.window.open(now);
        Ok(())
    }

    pub fn complete(&mut self, notes: Option<String>, now: DateTime<Utc>) -> TelemedResult<()> {
        self.transition(SessionStatus::Completed, now)?;
        self.window.close(now);
        self.notes = non_blank(notes);
        Ok(())
    }

    pub fn cancel(&mut self, reason: Option<String>, now: DateTime<Utc>) -> TelemedResult<()> {
        self.transition(SessionStatus::Cancelled, now)?;
        self.window.close(now);
        self.status_reason = non_blank(reason);
        Ok(())
    }

    pub fn fail(&mut self, error: Option<String>, now: DateTime<Utc>) -> TelemedResult<()> {
        self.transition(SessionStatus::Failed, now)?;
        self.window.close(now);
        self.status_reason = non_blank(error);
        Ok(())
    }

    /// Link the consent recorded for this session's appointment.
    pub fn mark_consented(&mut self, consent_id: Uuid, now: DateTime<Utc>) -> TelemedResult<()> {
        if self.status.is_terminal() {
            return Err(TelemedError::validation(format!(
                "cannot attach consent to a {} session",
                self.status
            )));
        }
        self.consent_id = Some(consent_id);
        self.updated_at = now;
        Ok(())
    }

    /// Store the provider's recording URL after completion.
    pub fn attach_recording_url(&mut self, url: String, now: DateTime<Utc>) -> TelemedResult<()> {
        require_text("recording url", &url)?;
        if self.status != SessionStatus::Completed {
            return Err(TelemedError::validation(
                "recording url can only be attached to a completed session",
            ));
        }
        self.recording_url = Some(url);
        self.updated_at = now;
        Ok(())
    }

    fn transition(&mut self, to: SessionStatus, now: DateTime<Utc>) -> TelemedResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(TelemedError::invalid_transition(ENTITY, self.status, to));
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }
}

/// Flat persistence shape of a session.
///
/// Only repositories should build one of these from stored data; turning
/// it back into an aggregate re-checks the invariants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub appointment_id: Uuid,
    pub clinic_id: Uuid,
    pub provider_id: Uuid,
    pub patient_id: Uuid,
    pub room_name: String,
    pub room_url: String,
    pub room_expires_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub recording_enabled: bool,
    pub consent_id: Option<Uuid>,
    pub recording_url: Option<String>,
    pub notes: Option<String>,
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl From<&TelemedicineSession> for SessionRecord {
    fn from(s: &TelemedicineSession) -> Self {
        Self {
            id: s.id,
            tenant_id: s.tenant_id,
            appointment_id: s.appointment_id,
            clinic_id: s.clinic_id,
            provider_id: s.provider_id,
            patient_id: s.patient_id,
            room_name: s.room.name.clone(),
            room_url: s.room.url.clone(),
            room_expires_at: s.room.expires_at,
            status: s.status,
            started_at: s.window.started_at,
            ended_at: s.window.ended_at,
            recording_enabled: s.recording_enabled,
            consent_id: s.consent_id,
            recording_url: s.recording_url.clone(),
            notes: s.notes.clone(),
            status_reason: s.status_reason.clone(),
            created_at: s.created_at,
            updated_at: s.updated_at,
            version: s.version,
        }
    }
}

impl TryFrom<SessionRecord> for TelemedicineSession {
    type Error = TelemedError;

    fn try_from(r: SessionRecord) -> Result<Self, Self::Error> {
        let window = SessionWindow::new(r.started_at, r.ended_at)?;
        if window.is_open() != (r.status == SessionStatus::InProgress) {
            return Err(TelemedError::validation(format!(
                "session {} is {} but its window is {}",
                r.id,
                r.status,
                if window.is_open() { "open" } else { "closed" }
            )));
        }

        Ok(Self {
            id: r.id,
            tenant_id: r.tenant_id,
            appointment_id: r.appointment_id,
            clinic_id: r.clinic_id,
            provider_id: r.provider_id,
            patient_id: r.patient_id,
            room: VideoRoom {
                name: r.room_name,
                url: r.room_url,
                expires_at: r.room_expires_at,
            },
            status: r.status,
            window,
            recording_enabled: r.recording_enabled,
            consent_id: r.consent_id,
            recording_url: r.recording_url,
            notes: r.notes,
            status_reason: r.status_reason,
            created_at: r.created_at,
            updated_at: r.updated_at,
            version: r.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduled() -> TelemedicineSession {
        let now = Utc::now();
        TelemedicineSession::schedule(
            NewSession {
                id: Uuid::new_v4(),
                tenant_id: Uuid::new_v4(),
                appointment_id: Uuid::new_v4(),
                clinic_id: Uuid::new_v4(),
                provider_id: Uuid::new_v4(),
                patient_id: Uuid::new_v4(),
                room: VideoRoom {
                    name: "tm-room".into(),
                    url: "https://video.example.com/tm-room".into(),
                    expires_at: now + Duration::hours(2),
                },
                recording_enabled: false,
            },
            now,
        )
        .unwrap()
    }

    #[test]
    fn new_session_is_scheduled_with_closed_window() {
        let s = scheduled();
        assert_eq!(s.status(), SessionStatus::Scheduled);
        assert!(!s.window().is_open());
        assert_eq!(s.window().started_at(), None);
        assert_eq!(s.version(), 0);
    }

    #[test]
    fn window_is_open_only_while_in_progress() {
        let mut s = scheduled();
        s.start(Utc::now()).unwrap();
        assert!(s.window().is_open());

        s.complete(Some("follow-up scheduled".into()), Utc::now())
            .unwrap();
        assert!(!s.window().is_open());
        assert!(s.window().ended_at().is_some());
        assert_eq!(s.notes(), Some("follow-up scheduled"));
    }

    #[test]
    fn completing_twice_is_an_invalid_transition() {
        let mut s = scheduled();
        s.start(Utc::now()).unwrap();
        s.complete(None, Utc::now()).unwrap();

        let err = s.complete(None, Utc::now()).unwrap_err();
        match err {
            TelemedError::InvalidStateTransition { from, to, .. } => {
                assert_eq!(from, "Completed");
                assert_eq!(to, "Completed");
            }
            other => panic!("expected InvalidStateTransition, got {other:?}"),
        }
    }

    #[test]
    fn scheduled_session_cannot_complete() {
        let mut s = scheduled();
        assert!(matches!(
            s.complete(None, Utc::now()),
            Err(TelemedError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn cancel_rejected_after_completion() {
        let mut s = scheduled();
        s.start(Utc::now()).unwrap();
        s.complete(None, Utc::now()).unwrap();
        assert!(s.cancel(Some("patient no-show".into()), Utc::now()).is_err());
        assert_eq!(s.status(), SessionStatus::Completed);
    }

    #[test]
    fn cancel_before_start_leaves_window_empty() {
        let mut s = scheduled();
        s.cancel(Some("rescheduled".into()), Utc::now()).unwrap();
        assert_eq!(s.status(), SessionStatus::Cancelled);
        assert_eq!(s.window().started_at(), None);
        assert_eq!(s.window().ended_at(), None);
        assert_eq!(s.status_reason(), Some("rescheduled"));
    }

    #[test]
    fn fail_closes_open_window() {
        let mut s = scheduled();
        s.start(Utc::now()).unwrap();
        s.fail(Some("media server crashed".into()), Utc::now())
            .unwrap();
        assert!(!s.window().is_open());
        assert!(s.window().duration().is_some());
        assert!(s.fail(None, Utc::now()).is_err());
    }

    #[test]
    fn blank_notes_are_dropped() {
        let mut s = scheduled();
        s.start(Utc::now()).unwrap();
        s.complete(Some("   ".into()), Utc::now()).unwrap();
        assert_eq!(s.notes(), None);
    }

    #[test]
    fn provider_and_patient_must_differ() {
        let now = Utc::now();
        let user = Uuid::new_v4();
        let err = TelemedicineSession::schedule(
            NewSession {
                id: Uuid::new_v4(),
                tenant_id: Uuid::new_v4(),
                appointment_id: Uuid::new_v4(),
                clinic_id: Uuid::new_v4(),
                provider_id: user,
                patient_id: user,
                room: VideoRoom {
                    name: "r".into(),
                    url: "https://v/r".into(),
                    expires_at: now,
                },
                recording_enabled: false,
            },
            now,
        )
        .unwrap_err();
        assert!(matches!(err, TelemedError::Validation { .. }));
    }

    #[test]
    fn consent_cannot_attach_to_terminal_session() {
        let mut s = scheduled();
        s.mark_consented(Uuid::new_v4(), Utc::now()).unwrap();
        assert!(s.consent_id().is_some());

        s.cancel(None, Utc::now()).unwrap();
        assert!(s.mark_consented(Uuid::new_v4(), Utc::now()).is_err());
    }

    #[test]
    fn record_round_trip_preserves_state() {
        let mut s = scheduled();
        s.start(Utc::now()).unwrap();
        let restored = TelemedicineSession::try_from(SessionRecord::from(&s)).unwrap();
        assert_eq!(restored, s);
    }

    #[test]
    fn hydration_rejects_in_progress_without_open_window() {
        let s = scheduled();
        let mut record = SessionRecord::from(&s);
        record.status = SessionStatus::InProgress;
        assert!(TelemedicineSession::try_from(record).is_err());
    }

    #[test]
    fn status_parses_from_its_display_form() {
        for status in [
            SessionStatus::Scheduled,
            SessionStatus::InProgress,
            SessionStatus::Completed,
            SessionStatus::Cancelled,
            SessionStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<SessionStatus>().unwrap(), status);
        }
        assert!("Paused".parse::<SessionStatus>().is_err());
    }
}
