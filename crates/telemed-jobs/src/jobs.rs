//! Sweeps run by the maintenance binary.

use telemed_core::error::{TelemedError, TelemedResult};
use telemed_core::events::EventPublisher;
use telemed_core::provider::RegistryValidator;
use telemed_core::repository::{
    ConsentRepository, IdentityVerificationRepository, RecordingRepository,
};
use telemed_service::{IdentityVerificationRegistry, RecordingRetentionEngine};
use uuid::Uuid;

const PURGE_REASON: &str = "retention period elapsed";

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub eligible: usize,
    pub deleted: usize,
    pub failed: usize,
}

pub async fn expire_verifications<I, G, E>(
    registry: &IdentityVerificationRegistry<I, G, E>,
    tenant_id: Uuid,
    limit: u64,
) -> TelemedResult<u64>
where
    I: IdentityVerificationRepository,
    G: RegistryValidator,
    E: EventPublisher,
{
    registry.expire_lapsed(tenant_id, limit).await
}

/// Soft-delete every recording whose retention window has ended.
///
/// One failing recording does not stop the sweep; it is counted and
/// logged. A recording deleted concurrently counts as done.
pub async fn purge_recordings<R, C, E>(
    retention: &RecordingRetentionEngine<R, C, E>,
    tenant_id: Uuid,
    operator_id: Uuid,
    limit: u64,
    dry_run: bool,
) -> TelemedResult<PurgeReport>
where
    R: RecordingRepository,
    C: ConsentRepository,
    E: EventPublisher,
{
    let purgeable = retention.list_purgeable(tenant_id, limit).await?;
    let mut report = PurgeReport {
        eligible: purgeable.len(),
        ..Default::default()
    };

    for recording in purgeable {
        if dry_run {
            tracing::info!(
                %tenant_id,
                recording_id = %recording.id(),
                retention_until = %recording.retention_until(),
                "Recording eligible for purge"
            );
            continue;
        }

        match retention
            .delete_recording(tenant_id, recording.id(), operator_id, PURGE_REASON)
            .await
        {
            Ok(_) | Err(TelemedError::AlreadyDeleted { .. }) => report.deleted += 1,
            Err(e) => {
                tracing::warn!(
                    %tenant_id,
                    recording_id = %recording.id(),
                    error = %e,
                    "Recording purge failed"
                );
                report.failed += 1;
            }
        }
    }

    Ok(report)
}
