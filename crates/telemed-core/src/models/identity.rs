//! Identity verification domain model.
//!
//! One record per verification event. Providers must additionally prove
//! professional-license standing, so their records always carry a
//! [`ProfessionalLicense`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{TelemedError, TelemedResult, non_blank, require_text};

const ENTITY: &str = "identity_verification";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum UserType {
    Provider,
    Patient,
}

impl UserType {
    pub fn as_str(self) -> &'static str {
        match self {
            UserType::Provider => "Provider",
            UserType::Patient => "Patient",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserType {
    type Err = TelemedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Provider" => Ok(UserType::Provider),
            "Patient" => Ok(UserType::Patient),
            other => Err(TelemedError::validation(format!("unknown user type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
    Expired,
}

impl VerificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::Pending => "Pending",
            VerificationStatus::Verified => "Verified",
            VerificationStatus::Rejected => "Rejected",
            VerificationStatus::Expired => "Expired",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationStatus {
    type Err = TelemedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(VerificationStatus::Pending),
            "Verified" => Ok(VerificationStatus::Verified),
            "Rejected" => Ok(VerificationStatus::Rejected),
            "Expired" => Ok(VerificationStatus::Expired),
            other => Err(TelemedError::validation(format!(
                "unknown verification status: {other}"
            ))),
        }
    }
}

/// Professional license evidence, mandatory for providers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfessionalLicense {
    /// Reference to the stored license-card photo.
    pub photo_ref: String,
    pub number: String,
    /// Issuing jurisdiction (state/council code).
    pub jurisdiction: String,
}

impl ProfessionalLicense {
    /// Build from optional parts; every part is required.
    pub fn from_parts(
        photo_ref: Option<String>,
        number: Option<String>,
        jurisdiction: Option<String>,
    ) -> TelemedResult<Self> {
        let photo_ref = non_blank(photo_ref)
            .ok_or_else(|| TelemedError::validation("provider license photo is required"))?;
        let number = non_blank(number)
            .ok_or_else(|| TelemedError::validation("provider license number is required"))?;
        let jurisdiction = non_blank(jurisdiction).ok_or_else(|| {
            TelemedError::validation("provider license jurisdiction is required")
        })?;

        // Registry lookups embed the number in a URL path segment.
        let number = number.trim().to_string();
        if number.len() > 32 || !number.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(TelemedError::validation(format!(
                "malformed license number: {number}"
            )));
        }
        let jurisdiction = jurisdiction.trim().to_ascii_uppercase();
        if jurisdiction.len() > 16 || !jurisdiction.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(TelemedError::validation(format!(
                "malformed license jurisdiction: {jurisdiction}"
            )));
        }

        Ok(Self {
            photo_ref,
            number,
            jurisdiction,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewVerification {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub user_type: UserType,
    pub document_type: String,
    pub document_number: String,
    pub document_photo_ref: String,
    pub selfie_ref: Option<String>,
    pub license_photo_ref: Option<String>,
    pub license_number: Option<String>,
    pub license_jurisdiction: Option<String>,
    pub session_id: Option<Uuid>,
    pub validity_years: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IdentityVerification {
    id: Uuid,
    tenant_id: Uuid,
    user_id: Uuid,
    user_type: UserType,
    document_type: String,
    document_number: String,
    document_photo_ref: String,
    selfie_ref: Option<String>,
    license: Option<ProfessionalLicense>,
    status: VerificationStatus,
    verified_at: Option<DateTime<Utc>>,
    verifier_id: Option<Uuid>,
    notes: Option<String>,
    rejection_reason: Option<String>,
    session_id: Option<Uuid>,
    valid_until: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl IdentityVerification {
    /// Create a `Pending` verification.
    ///
    /// Provider submissions without all three license fields fail here,
    /// not at approval time.
    pub fn submit(input: NewVerification, now: DateTime<Utc>) -> TelemedResult<Self> {
        require_text("document_type", &input.document_type)?;
        require_text("document_number", &input.document_number)?;
        require_text("document_photo", &input.document_photo_ref)?;
        if input.validity_years == 0 {
            return Err(TelemedError::validation(
                "validity_years must be at least 1",
            ));
        }

        let license = match input.user_type {
            UserType::Provider => Some(ProfessionalLicense::from_parts(
                input.license_photo_ref,
                input.license_number,
                input.license_jurisdiction,
            )?),
            UserType::Patient => None,
        };

        let valid_until = now
            .checked_add_months(Months::new(input.validity_years.saturating_mul(12)))
            .ok_or_else(|| TelemedError::validation("validity_years out of range"))?;

        Ok(Self {
            id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            user_id: input.user_id,
            user_type: input.user_type,
            document_type: input.document_type.trim().to_string(),
            document_number: input.document_number.trim().to_string(),
            document_photo_ref: input.document_photo_ref,
            selfie_ref: non_blank(input.selfie_ref),
            license,
            status: VerificationStatus::Pending,
            verified_at: None,
            verifier_id: None,
            notes: None,
            rejection_reason: None,
            session_id: input.session_id,
            valid_until,
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

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn user_type(&self) -> UserType {
        self.user_type
    }

    pub fn document_type(&self) -> &str {
        &self.document_type
    }

    pub fn document_number(&self) -> &str {
        &self.document_number
    }

    pub fn document_photo_ref(&self) -> &str {
        &self.document_photo_ref
    }

    pub fn selfie_ref(&self) -> Option<&str> {
        self.selfie_ref.as_deref()
    }

    pub fn license(&self) -> Option<&ProfessionalLicense> {
        self.license.as_ref()
    }

    pub fn status(&self) -> VerificationStatus {
        self.status
    }

    pub fn verified_at(&self) -> Option<DateTime<Utc>> {
        self.verified_at
    }

    pub fn verifier_id(&self) -> Option<Uuid> {
        self.verifier_id
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    pub fn valid_until(&self) -> DateTime<Utc> {
        self.valid_until
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

    pub fn has_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.valid_until <= now
    }

    pub fn is_currently_valid(&self, now: DateTime<Utc>) -> bool {
        self.status == VerificationStatus::Verified && !self.has_lapsed(now)
    }

    pub fn approve(
        &mut self,
        verifier_id: Option<Uuid>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> TelemedResult<()> {
        self.require_pending(VerificationStatus::Verified)?;
        if self.has_lapsed(now) {
            return Err(TelemedError::validation(format!(
                "verification {} lapsed at {} and can only expire",
                self.id, self.valid_until
            )));
        }
        self.status = VerificationStatus::Verified;
        self.verified_at = Some(now);
        self.verifier_id = verifier_id;
        self.notes = non_blank(notes);
        self.updated_at = now;
        Ok(())
    }

    pub fn reject(
        &mut self,
        reason: &str,
        verifier_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> TelemedResult<()> {
        require_text("rejection reason", reason)?;
        self.require_pending(VerificationStatus::Rejected)?;
        self.status = VerificationStatus::Rejected;
        self.verifier_id = verifier_id;
        self.rejection_reason = Some(reason.trim().to_string());
        self.updated_at = now;
        Ok(())
    }

    /// Move a lapsed record to `Expired`, whatever its review outcome.
    ///
    /// Returns `Ok(false)` if the record was already expired.
    pub fn expire(&mut self, now: DateTime<Utc>) -> TelemedResult<bool> {
        if self.status == VerificationStatus::Expired {
            return Ok(false);
        }
        if !self.has_lapsed(now) {
            return Err(TelemedError::validation(format!(
                "verification {} is valid until {}",
                self.id, self.valid_until
            )));
        }
        self.status = VerificationStatus::Expired;
        self.updated_at = now;
        Ok(true)
    }

    fn require_pending(&self, to: VerificationStatus) -> TelemedResult<()> {
        if self.status != VerificationStatus::Pending {
            return Err(TelemedError::invalid_transition(ENTITY, self.status, to));
        }
        Ok(())
    }
}

/// Flat persistence shape of an identity verification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub user_type: UserType,
    pub document_type: String,
    pub document_number: String,
    pub document_photo_ref: String,
    pub selfie_ref: Option<String>,
    pub license_photo_ref: Option<String>,
    pub license_number: Option<String>,
    pub license_jurisdiction: Option<String>,
    pub status: VerificationStatus,
    pub verified_at: Option<DateTime<Utc>>,
    pub verifier_id: Option<Uuid>,
    pub notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub session_id: Option<Uuid>,
    pub valid_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl From<&IdentityVerification> for VerificationRecord {
    fn from(v: &IdentityVerification) -> Self {
        Self {
            id: v.id,
            tenant_id: v.tenant_id,
            user_id: v.user_id,
            user_type: v.user_type,
            document_type: v.document_type.clone(),
            document_number: v.document_number.clone(),
            document_photo_ref: v.document_photo_ref.clone(),
            selfie_ref: v.selfie_ref.clone(),
            license_photo_ref: v.license.as_ref().map(|l| l.photo_ref.clone()),
            license_number: v.license.as_ref().map(|l| l.number.clone()),
            license_jurisdiction: v.license.as_ref().map(|l| l.jurisdiction.clone()),
            status: v.status,
            verified_at: v.verified_at,
            verifier_id: v.verifier_id,
            notes: v.notes.clone(),
            rejection_reason: v.rejection_reason.clone(),
            session_id: v.session_id,
            valid_until: v.valid_until,
            created_at: v.created_at,
            updated_at: v.updated_at,
            version: v.version,
        }
    }
}

impl TryFrom<VerificationRecord> for IdentityVerification {
    type Error = TelemedError;

    fn try_from(r: VerificationRecord) -> Result<Self, Self::Error> {
        let license = match r.user_type {
            UserType::Provider => Some(ProfessionalLicense::from_parts(
                r.license_photo_ref,
                r.license_number,
                r.license_jurisdiction,
            )?),
            UserType::Patient => None,
        };
        if r.status == VerificationStatus::Verified && r.verified_at.is_none() {
            return Err(TelemedError::validation(format!(
                "verification {} is Verified without a verification time",
                r.id
            )));
        }

        Ok(Self {
            id: r.id,
            tenant_id: r.tenant_id,
            user_id: r.user_id,
            user_type: r.user_type,
            document_type: r.document_type,
            document_number: r.document_number,
            document_photo_ref: r.document_photo_ref,
            selfie_ref: r.selfie_ref,
            license,
            status: r.status,
            verified_at: r.verified_at,
            verifier_id: r.verifier_id,
            notes: r.notes,
            rejection_reason: r.rejection_reason,
            session_id: r.session_id,
            valid_until: r.valid_until,
            created_at: r.created_at,
            updated_at: r.updated_at,
            version: r.version,
        })
    }
}
