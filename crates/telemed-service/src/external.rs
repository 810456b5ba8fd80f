//! Guards around calls that leave the process.

use std::time::Duration;

use chrono::Utc;
use telemed_core::error::{TelemedError, TelemedResult};
use telemed_core::events::{DomainEvent, EventEnvelope, EventPublisher};
use tracing::warn;
use uuid::Uuid;

/// Run an external call under `limit`.
///
/// An elapsed timeout becomes [`TelemedError::ExternalServiceUnavailable`].
/// The call is never retried.
pub(crate) async fn bounded<T>(
    service: &'static str,
    limit: Duration,
    call: impl Future<Output = TelemedResult<T>>,
) -> TelemedResult<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(TelemedError::unavailable(
            service,
            format!("no response within {}ms", limit.as_millis()),
        )),
    }
}

/// Publish a domain event for a transition that is already persisted.
///
/// Failures are logged and swallowed.
pub(crate) async fn emit<E: EventPublisher>(publisher: &E, tenant_id: Uuid, event: DomainEvent) {
    let name = event.name();
    let envelope = EventEnvelope::new(tenant_id, event, Utc::now());
    if let Err(err) = publisher.publish(envelope).await {
        warn!(%tenant_id, event = name, error = %err, "Failed to publish domain event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn elapsed_timeout_is_external_service_unavailable() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, TelemedError>(())
        };
        let err = bounded("video_provider", Duration::from_millis(10), slow)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TelemedError::ExternalServiceUnavailable { ref service, .. } if service == "video_provider"
        ));
    }

    #[tokio::test]
    async fn completed_call_passes_through() {
        let value = bounded("registry", Duration::from_secs(1), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
