//! Identity verification registry for providers and patients.

use chrono::Utc;
use telemed_core::error::{TelemedError, TelemedResult};
use telemed_core::events::{DomainEvent, EventPublisher};
use telemed_core::models::identity::{
    IdentityVerification, NewVerification, UserType, VerificationStatus,
};
use telemed_core::provider::RegistryValidator;
use telemed_core::repository::IdentityVerificationRepository;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::TelemedConfig;
use crate::external::{bounded, emit};

const REGISTRY: &str = "registry_validator";

/// Identity proof submitted by a provider or patient.
#[derive(Debug, Clone)]
pub struct SubmitVerification {
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
    /// Falls back to [`TelemedConfig::identity_validity_years`].
    pub validity_years: Option<u32>,
}

pub struct IdentityVerificationRegistry<I, G, E>
where
    I: IdentityVerificationRepository,
    G: RegistryValidator,
    E: EventPublisher,
{
    verifications: I,
    registry: G,
    publisher: E,
    config: TelemedConfig,
}

impl<I, G, E> IdentityVerificationRegistry<I, G, E>
where
    I: IdentityVerificationRepository,
    G: RegistryValidator,
    E: EventPublisher,
{
    pub fn new(verifications: I, registry: G, publisher: E, config: TelemedConfig) -> Self {
        Self {
            verifications,
            registry,
            publisher,
            config,
        }
    }

    pub async fn submit_verification(
        &self,
        tenant_id: Uuid,
        input: SubmitVerification,
    ) -> TelemedResult<IdentityVerification> {
        let verification = IdentityVerification::submit(
            NewVerification {
                tenant_id,
                user_id: input.user_id,
                user_type: input.user_type,
                document_type: input.document_type,
                document_number: input.document_number,
                document_photo_ref: input.document_photo_ref,
                selfie_ref: input.selfie_ref,
                license_photo_ref: input.license_photo_ref,
                license_number: input.license_number,
                license_jurisdiction: input.license_jurisdiction,
                session_id: input.session_id,
                validity_years: input
                    .validity_years
                    .unwrap_or(self.config.identity_validity_years),
            },
            Utc::now(),
        )?;
        let verification = self.verifications.create(&verification).await?;

        info!(
            %tenant_id,
            verification_id = %verification.id(),
            user_type = %verification.user_type(),
            "Identity verification submitted"
        );
        emit(
            &self.publisher,
            tenant_id,
            DomainEvent::VerificationSubmitted {
                verification_id: verification.id(),
                user_id: verification.user_id(),
                user_type: verification.user_type(),
            },
        )
        .await;

        Ok(verification)
    }

    pub async fn approve(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        verifier_id: Option<Uuid>,
        notes: Option<String>,
    ) -> TelemedResult<IdentityVerification> {
        let mut verification = self.verifications.get_by_id(tenant_id, id).await?;
        verification.approve(verifier_id, notes, Utc::now())?;
        let verification = self.verifications.update(&verification).await?;

        info!(%tenant_id, verification_id = %id, "Identity verification approved");
        emit(
            &self.publisher,
            tenant_id,
            DomainEvent::VerificationApproved {
                verification_id: id,
                user_id: verification.user_id(),
            },
        )
        .await;

        Ok(verification)
    }

    pub async fn reject(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        reason: &str,
        verifier_id: Option<Uuid>,
    ) -> TelemedResult<IdentityVerification> {
        let mut verification = self.verifications.get_by_id(tenant_id, id).await?;
        verification.reject(reason, verifier_id, Utc::now())?;
        let verification = self.verifications.update(&verification).await?;

        info!(%tenant_id, verification_id = %id, "Identity verification rejected");
        emit(
            &self.publisher,
            tenant_id,
            DomainEvent::VerificationRejected {
                verification_id: id,
                user_id: verification.user_id(),
                reason: reason.trim().to_string(),
            },
        )
        .await;

        Ok(verification)
    }

    pub async fn is_currently_valid(&self, tenant_id: Uuid, id: Uuid) -> TelemedResult<bool> {
        let verification = self.verifications.get_by_id(tenant_id, id).await?;
        Ok(verification.is_currently_valid(Utc::now()))
    }

    /// Whether the user's most recent verification is currently valid.
    pub async fn is_user_verified(&self, tenant_id: Uuid, user_id: Uuid) -> TelemedResult<bool> {
        let now = Utc::now();
        Ok(self
            .verifications
            .latest_for_user(tenant_id, user_id)
            .await?
            .is_some_and(|v| v.is_currently_valid(now)))
    }

    /// Move a lapsed verification to `Expired`.
    ///
    /// Returns `false` when it was already expired.
    pub async fn expire(&self, tenant_id: Uuid, id: Uuid) -> TelemedResult<bool> {
        let verification = self.verifications.get_by_id(tenant_id, id).await?;
        self.expire_one(verification).await
    }

    async fn expire_one(&self, mut verification: IdentityVerification) -> TelemedResult<bool> {
        if !verification.expire(Utc::now())? {
            return Ok(false);
        }
        let verification = self.verifications.update(&verification).await?;
        let tenant_id = verification.tenant_id();

        info!(
            %tenant_id,
            verification_id = %verification.id(),
            "Identity verification expired"
        );
        emit(
            &self.publisher,
            tenant_id,
            DomainEvent::VerificationExpired {
                verification_id: verification.id(),
                user_id: verification.user_id(),
            },
        )
        .await;
        Ok(true)
    }

    /// Expire up to `limit` lapsed verifications; returns how many moved.
    ///
    /// A record that changed underneath the sweep is skipped and picked up
    /// by the next run.
    pub async fn expire_lapsed(&self, tenant_id: Uuid, limit: u64) -> TelemedResult<u64> {
        let lapsed = self
            .verifications
            .list_lapsed(tenant_id, Utc::now(), limit)
            .await?;

        let mut expired = 0;
        for verification in lapsed {
            let id = verification.id();
            match self.expire_one(verification).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(TelemedError::ConcurrentModification { .. }) => {
                    warn!(%tenant_id, verification_id = %id, "Skipping verification modified during sweep");
                }
                Err(err) => return Err(err),
            }
        }

        info!(%tenant_id, expired, "Identity expiry sweep finished");
        Ok(expired)
    }

    /// Ask the external registry about a pending verification and record
    /// its verdict.
    ///
    /// Providers are checked by license, patients by national id. An
    /// invalid answer rejects the verification; only transport failures
    /// are errors.
    pub async fn validate_against_registry(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> TelemedResult<IdentityVerification> {
        let verification = self.verifications.get_by_id(tenant_id, id).await?;
        if verification.status() != VerificationStatus::Pending {
            return Err(TelemedError::invalid_transition(
                "identity_verification",
                verification.status(),
                VerificationStatus::Verified,
            ));
        }

        let limit = self.config.external_call_timeout;
        let (is_valid, note) = match verification.user_type() {
            UserType::Provider => {
                let license = verification.license().ok_or_else(|| {
                    TelemedError::Internal(format!("provider verification {id} has no license"))
                })?;
                let result = bounded(
                    REGISTRY,
                    limit,
                    self.registry
                        .validate_license(&license.number, &license.jurisdiction),
                )
                .await?;
                let note = if result.is_valid {
                    let mut note = format!("registry confirmed license {}", license.number);
                    if let Some(holder) = result.holder_name {
                        note.push_str(&format!(" held by {holder}"));
                    }
                    if let Some(standing) = result.status {
                        note.push_str(&format!(" ({standing})"));
                    }
                    note
                } else {
                    result
                        .error_message
                        .unwrap_or_else(|| "license not found in registry".into())
                };
                (result.is_valid, note)
            }
            UserType::Patient => {
                let result = bounded(
                    REGISTRY,
                    limit,
                    self.registry
                        .validate_national_id(verification.document_number()),
                )
                .await?;
                let note = if result.is_valid {
                    "registry confirmed national id".to_string()
                } else {
                    result
                        .error_message
                        .unwrap_or_else(|| "national id not found in registry".into())
                };
                (result.is_valid, note)
            }
        };

        info!(%tenant_id, verification_id = %id, is_valid, "Registry verdict received");
        if is_valid {
            self.approve(tenant_id, id, None, Some(note)).await
        } else {
            self.reject(tenant_id, id, &note, None).await
        }
    }
}
