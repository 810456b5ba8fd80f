//! Telemedicine services: the session lifecycle manager and the
//! consent, identity, first-encounter and recording components it
//! coordinates.
//!
//! Services are generic over the repository and provider traits from
//! `telemed-core`, so this crate has no dependency on the database or on
//! any concrete video provider.

pub mod config;
pub mod consent;
mod external;
pub mod first_encounter;
pub mod identity;
pub mod retention;
pub mod session;

pub use config::TelemedConfig;
pub use consent::ConsentLedger;
pub use first_encounter::FirstEncounterPolicyEngine;
pub use identity::{IdentityVerificationRegistry, SubmitVerification};
pub use retention::{BeginRecording, RecordingRetentionEngine};
pub use session::{
    CreateSessionRequest, JoinCredentials, ParticipantRole, SessionLifecycleManager,
};
