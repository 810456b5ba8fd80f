//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async and tenant-scoped: every lookup
//! takes a `tenant_id` and never returns another tenant's data.
//!
//! `update` is a conditional write. It succeeds only if the stored
//! version still equals the aggregate's version, and returns the
//! aggregate with its version bumped. A stale write fails with
//! [`TelemedError::ConcurrentModification`](crate::error::TelemedError).

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::TelemedResult;
use crate::models::{
    consent::TelemedicineConsent, encounter::FirstEncounterException,
    identity::IdentityVerification, recording::TelemedicineRecording,
    session::TelemedicineSession,
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

pub trait SessionRepository: Send + Sync {
    fn create(
        &self,
        session: &TelemedicineSession,
    ) -> impl Future<Output = TelemedResult<TelemedicineSession>> + Send;
    fn get_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = TelemedResult<TelemedicineSession>> + Send;
    fn update(
        &self,
        session: &TelemedicineSession,
    ) -> impl Future<Output = TelemedResult<TelemedicineSession>> + Send;
    /// The non-terminal session for an appointment, if any.
    fn get_active_by_appointment(
        &self,
        tenant_id: Uuid,
        appointment_id: Uuid,
    ) -> impl Future<Output = TelemedResult<Option<TelemedicineSession>>> + Send;
    /// Most recent session (any status) between a patient and a provider.
    fn latest_between(
        &self,
        tenant_id: Uuid,
        patient_id: Uuid,
        provider_id: Uuid,
    ) -> impl Future<Output = TelemedResult<Option<TelemedicineSession>>> + Send;
    fn list_by_patient(
        &self,
        tenant_id: Uuid,
        patient_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = TelemedResult<PaginatedResult<TelemedicineSession>>> + Send;
}

pub trait ConsentRepository: Send + Sync {
    fn create(
        &self,
        consent: &TelemedicineConsent,
    ) -> impl Future<Output = TelemedResult<TelemedicineConsent>> + Send;
    fn get_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = TelemedResult<TelemedicineConsent>> + Send;
    fn update(
        &self,
        consent: &TelemedicineConsent,
    ) -> impl Future<Output = TelemedResult<TelemedicineConsent>> + Send;
    /// Consent history of a patient, newest first.
    fn list_by_patient(
        &self,
        tenant_id: Uuid,
        patient_id: Uuid,
        active_only: bool,
        pagination: Pagination,
    ) -> impl Future<Output = TelemedResult<PaginatedResult<TelemedicineConsent>>> + Send;
    /// Whether the patient holds an active consent given at or before `now`.
    fn has_valid_consent(
        &self,
        tenant_id: Uuid,
        patient_id: Uuid,
        now: DateTime<Utc>,
    ) -> impl Future<Output = TelemedResult<bool>> + Send;
}

pub trait IdentityVerificationRepository: Send + Sync {
    fn create(
        &self,
        verification: &IdentityVerification,
    ) -> impl Future<Output = TelemedResult<IdentityVerification>> + Send;
    fn get_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = TelemedResult<IdentityVerification>> + Send;
    fn update(
        &self,
        verification: &IdentityVerification,
    ) -> impl Future<Output = TelemedResult<IdentityVerification>> + Send;
    /// Most recently submitted verification for a user.
    fn latest_for_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> impl Future<Output = TelemedResult<Option<IdentityVerification>>> + Send;
    /// Non-expired verifications whose `valid_until` is at or before `now`.
    fn list_lapsed(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
        limit: u64,
    ) -> impl Future<Output = TelemedResult<Vec<IdentityVerification>>> + Send;
}

pub trait RecordingRepository: Send + Sync {
    fn create(
        &self,
        recording: &TelemedicineRecording,
    ) -> impl Future<Output = TelemedResult<TelemedicineRecording>> + Send;
    fn get_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = TelemedResult<TelemedicineRecording>> + Send;
    fn update(
        &self,
        recording: &TelemedicineRecording,
    ) -> impl Future<Output = TelemedResult<TelemedicineRecording>> + Send;
    fn get_by_session(
        &self,
        tenant_id: Uuid,
        session_id: Uuid,
    ) -> impl Future<Output = TelemedResult<Option<TelemedicineRecording>>> + Send;
    /// Non-deleted recordings whose retention window ended at or before `now`.
    fn list_purgeable(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
        limit: u64,
    ) -> impl Future<Output = TelemedResult<Vec<TelemedicineRecording>>> + Send;
}

/// Append-only store of justified first-encounter exceptions.
pub trait FirstEncounterExceptionRepository: Send + Sync {
    fn create(
        &self,
        exception: &FirstEncounterException,
    ) -> impl Future<Output = TelemedResult<FirstEncounterException>> + Send;
    fn list_for_pair(
        &self,
        tenant_id: Uuid,
        patient_id: Uuid,
        provider_id: Uuid,
    ) -> impl Future<Output = TelemedResult<Vec<FirstEncounterException>>> + Send;
}
