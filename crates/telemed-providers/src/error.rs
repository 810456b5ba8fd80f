//! Provider-specific error types and conversions.

use telemed_core::error::TelemedError;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} answered HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} sent an unexpected payload: {reason}")]
    Payload {
        service: &'static str,
        reason: String,
    },

    #[error("Token signing failed: {0}")]
    Token(String),

    #[error("Invalid provider configuration: {0}")]
    Config(String),
}

impl ProviderError {
    pub(crate) fn transport(service: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| ProviderError::Transport { service, source }
    }

    pub(crate) fn payload(service: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |e| ProviderError::Payload {
            service,
            reason: e.to_string(),
        }
    }
}

/// Pass 2xx responses through; anything else becomes
/// [`ProviderError::Status`] carrying the body text.
pub(crate) async fn ensure_success(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        service,
        status: status.as_u16(),
        body,
    })
}

impl From<ProviderError> for TelemedError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Transport { service, .. }
            | ProviderError::Status { service, .. }
            | ProviderError::Payload { service, .. } => {
                TelemedError::unavailable(service, err.to_string())
            }
            ProviderError::Token(_) | ProviderError::Config(_) => {
                TelemedError::Internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_failures_become_service_unavailable() {
        let err: TelemedError = ProviderError::Status {
            service: "registry_validator",
            status: 502,
            body: "bad gateway".into(),
        }
        .into();
        match err {
            TelemedError::ExternalServiceUnavailable { service, reason } => {
                assert_eq!(service, "registry_validator");
                assert!(reason.contains("502"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn signing_failures_are_internal() {
        let err: TelemedError = ProviderError::Token("bad key".into()).into();
        assert!(matches!(err, TelemedError::Internal(_)));
    }
}
