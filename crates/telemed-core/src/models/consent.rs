//! Telemedicine consent domain model.
//!
//! A consent is an append-only audit record: once captured, its only
//! mutation is a single revocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{TelemedError, TelemedResult, non_blank, require_text};

/// Patient-supplied consent capture.
#[derive(Debug, Clone)]
pub struct NewConsent {
    pub tenant_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub accepts_recording: bool,
    pub accepts_data_sharing: bool,
    pub ip_address: String,
    pub user_agent: String,
    /// Verbatim text shown to the patient.
    pub consent_text: String,
    pub digital_signature: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Revocation {
    pub revoked_at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TelemedicineConsent {
    id: Uuid,
    tenant_id: Uuid,
    patient_id: Uuid,
    appointment_id: Option<Uuid>,
    consented_at: DateTime<Utc>,
    consent_text: String,
    consent_text_sha256: String,
    ip_address: String,
    user_agent: String,
    accepts_recording: bool,
    accepts_data_sharing: bool,
    digital_signature: Option<String>,
    revocation: Option<Revocation>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

/// SHA-256 of the consent text, hex-encoded.
pub fn consent_text_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

impl TelemedicineConsent {
    pub fn record(input: NewConsent, now: DateTime<Utc>) -> TelemedResult<Self> {
        require_text("ip_address", &input.ip_address)?;
        require_text("user_agent", &input.user_agent)?;
        require_text("consent_text", &input.consent_text)?;

        Ok(Self {
            id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            patient_id: input.patient_id,
            appointment_id: input.appointment_id,
            consented_at: now,
            consent_text_sha256: consent_text_digest(&input.consent_text),
            consent_text: input.consent_text,
            ip_address: input.ip_address.trim().to_string(),
            user_agent: input.user_agent,
            accepts_recording: input.accepts_recording,
            accepts_data_sharing: input.accepts_data_sharing,
            digital_signature: non_blank(input.digital_signature),
            revocation: None,
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

    pub fn patient_id(&self) -> Uuid {
        self.patient_id
    }

    pub fn appointment_id(&self) -> Option<Uuid> {
        self.appointment_id
    }

    pub fn consented_at(&self) -> DateTime<Utc> {
        self.consented_at
    }

    pub fn consent_text(&self) -> &str {
        &self.consent_text
    }

    pub fn consent_text_sha256(&self) -> &str {
        &self.consent_text_sha256
    }

    pub fn ip_address(&self) -> &str {
        &self.ip_address
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn accepts_recording(&self) -> bool {
        self.accepts_recording
    }

    pub fn accepts_data_sharing(&self) -> bool {
        self.accepts_data_sharing
    }

    pub fn digital_signature(&self) -> Option<&str> {
        self.digital_signature.as_deref()
    }

    pub fn revocation(&self) -> Option<&Revocation> {
        self.revocation.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.revocation.is_none()
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

    /// Active and already in effect at `now`.
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.consented_at <= now
    }

    /// Whether this consent can authorize a recording at `now`.
    pub fn authorizes_recording(&self, now: DateTime<Utc>) -> bool {
        self.is_current(now) && self.accepts_recording
    }

    pub fn revoke(&mut self, reason: &str, now: DateTime<Utc>) -> TelemedResult<()> {
        require_text("revocation reason", reason)?;
        if self.revocation.is_some() {
            return Err(TelemedError::AlreadyRevoked {
                id: self.id.to_string(),
            });
        }
        self.revocation = Some(Revocation {
            revoked_at: now,
            reason: reason.trim().to_string(),
        });
        self.updated_at = now;
        Ok(())
    }
}

/// Flat persistence shape of a consent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsentRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub consented_at: DateTime<Utc>,
    pub consent_text: String,
    pub consent_text_sha256: String,
    pub ip_address: String,
    pub user_agent: String,
    pub accepts_recording: bool,
    pub accepts_data_sharing: bool,
    pub digital_signature: Option<String>,
    pub is_active: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revocation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl From<&TelemedicineConsent> for ConsentRecord {
    fn from(c: &TelemedicineConsent) -> Self {
        Self {
            id: c.id,
            tenant_id: c.tenant_id,
            patient_id: c.patient_id,
            appointment_id: c.appointment_id,
            consented_at: c.consented_at,
            consent_text: c.consent_text.clone(),
            consent_text_sha256: c.consent_text_sha256.clone(),
            ip_address: c.ip_address.clone(),
            user_agent: c.user_agent.clone(),
            accepts_recording: c.accepts_recording,
            accepts_data_sharing: c.accepts_data_sharing,
            digital_signature: c.digital_signature.clone(),
            is_active: c.is_active(),
            revoked_at: c.revocation.as_ref().map(|r| r.revoked_at),
            revocation_reason: c.revocation.as_ref().map(|r| r.reason.clone()),
            created_at: c.created_at,
            updated_at: c.updated_at,
            version: c.version,
        }
    }
}

impl TryFrom<ConsentRecord> for TelemedicineConsent {
    type Error = TelemedError;

    fn try_from(r: ConsentRecord) -> Result<Self, Self::Error> {
        require_text("consent_text", &r.consent_text)?;
        if consent_text_digest(&r.consent_text) != r.consent_text_sha256 {
            return Err(TelemedError::validation(format!(
                "consent {} text does not match its recorded digest",
                r.id
            )));
        }

        let revocation = match (r.is_active, r.revoked_at, r.revocation_reason) {
            (true, None, None) => None,
            (false, Some(revoked_at), Some(reason)) => Some(Revocation { revoked_at, reason }),
            _ => {
                return Err(TelemedError::validation(format!(
                    "consent {} has inconsistent revocation fields",
                    r.id
                )));
            }
        };

        Ok(Self {
            id: r.id,
            tenant_id: r.tenant_id,
            patient_id: r.patient_id,
            appointment_id: r.appointment_id,
            consented_at: r.consented_at,
            consent_text: r.consent_text,
            consent_text_sha256: r.consent_text_sha256,
            ip_address: r.ip_address,
            user_agent: r.user_agent,
            accepts_recording: r.accepts_recording,
            accepts_data_sharing: r.accepts_data_sharing,
            digital_signature: r.digital_signature,
            revocation,
            created_at: r.created_at,
            updated_at: r.updated_at,
            version: r.version,
        })
    }
}
