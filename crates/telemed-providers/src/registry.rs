//! HTTP client for the national registry lookups.

use reqwest::{Client, Url};
use serde::Deserialize;
use telemed_core::error::TelemedResult;
use telemed_core::provider::{LicenseValidation, NationalIdValidation, RegistryValidator};

use crate::config::RegistryConfig;
use crate::error::ProviderError;

const SERVICE: &str = "registry_validator";

#[derive(Debug, Deserialize)]
struct LicenseRecord {
    holder_name: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NationalIdRecord {
    #[serde(default = "default_true")]
    valid: bool,
    message: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Validator backed by a registry REST service.
///
/// `GET {base}/licenses/{jurisdiction}/{number}` and
/// `GET {base}/national-ids/{id}`. Any non-2xx answer is an invalid
/// verdict; only transport failures are errors.
#[derive(Clone)]
pub struct HttpRegistryValidator {
    client: Client,
    config: RegistryConfig,
}

impl HttpRegistryValidator {
    pub fn new(config: RegistryConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ProviderError::transport(SERVICE))?;
        Ok(Self { client, config })
    }

    /// Base URL plus `segments`, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| ProviderError::Config(format!("registry base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::Config("registry base URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn lookup(&self, segments: &[&str]) -> Result<reqwest::Response, ProviderError> {
        let mut request = self.client.get(self.endpoint(segments)?);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        request.send().await.map_err(ProviderError::transport(SERVICE))
    }
}

/// Non-empty and free of anything a server could read as path structure.
fn is_path_safe(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Registry standings that count as a valid license.
fn is_good_standing(status: Option<&str>) -> bool {
    match status {
        None => true,
        Some(s) => s.eq_ignore_ascii_case("active") || s.eq_ignore_ascii_case("regular"),
    }
}

impl RegistryValidator for HttpRegistryValidator {
    async fn validate_license(
        &self,
        number: &str,
        jurisdiction: &str,
    ) -> TelemedResult<LicenseValidation> {
        let number = number.trim();
        if !is_path_safe(number) {
            return Ok(LicenseValidation::invalid(format!(
                "malformed license number: {number}"
            )));
        }
        let jurisdiction = jurisdiction.trim().to_uppercase();
        if !is_path_safe(&jurisdiction) {
            return Ok(LicenseValidation::invalid(format!(
                "malformed license jurisdiction: {jurisdiction}"
            )));
        }

        let response = self.lookup(&["licenses", &jurisdiction, number]).await?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(%status, %jurisdiction, "License lookup answered non-2xx");
            return Ok(LicenseValidation::invalid(format!(
                "license not found in registry (HTTP {})",
                status.as_u16()
            )));
        }

        let record: LicenseRecord = response
            .json()
            .await
            .map_err(ProviderError::payload(SERVICE))?;
        let is_valid = is_good_standing(record.status.as_deref());
        let error_message = (!is_valid).then(|| {
            format!(
                "license is not in good standing: {}",
                record.status.as_deref().unwrap_or("unknown")
            )
        });

        Ok(LicenseValidation {
            is_valid,
            holder_name: record.holder_name,
            status: record.status,
            error_message,
        })
    }

    async fn validate_national_id(&self, national_id: &str) -> TelemedResult<NationalIdValidation> {
        let digits: String = national_id.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return Ok(NationalIdValidation::invalid("national id has no digits"));
        }

        let response = self.lookup(&["national-ids", &digits]).await?;
        let status = response.status();
        if !status.is_success() {
            return Ok(NationalIdValidation::invalid(format!(
                "national id not found in registry (HTTP {})",
                status.as_u16()
            )));
        }

        let record: NationalIdRecord = response
            .json()
            .await
            .map_err(ProviderError::payload(SERVICE))?;
        Ok(NationalIdValidation {
            is_valid: record.valid,
            error_message: if record.valid { None } else { record.message },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(base_url: &str) -> HttpRegistryValidator {
        HttpRegistryValidator::new(RegistryConfig {
            base_url: base_url.into(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn segments_are_percent_encoded() {
        let url = validator("http://registry.test/api/")
            .endpoint(&["licenses", "RJ", "../SP/123456"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://registry.test/api/licenses/RJ/..%2FSP%2F123456"
        );
    }

    #[test]
    fn path_safety() {
        assert!(is_path_safe("CRM-123456"));
        assert!(!is_path_safe("../SP/123456"));
        assert!(!is_path_safe(".."));
        assert!(!is_path_safe(""));
    }

    #[test]
    fn standing() {
        assert!(is_good_standing(None));
        assert!(is_good_standing(Some("ACTIVE")));
        assert!(is_good_standing(Some("Regular")));
        assert!(!is_good_standing(Some("suspended")));
    }
}
