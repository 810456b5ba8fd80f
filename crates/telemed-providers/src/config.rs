//! Provider client configuration.

use std::time::Duration;

/// Settings for [`HostedRoomVideoProvider`](crate::HostedRoomVideoProvider).
#[derive(Debug, Clone)]
pub struct HostedRoomConfig {
    /// REST API root, e.g. `https://api.video.example/v1`.
    pub api_base_url: String,
    pub api_key: String,
    /// Per-request HTTP timeout (default: 10 seconds).
    pub request_timeout: Duration,
    /// Whether new rooms record to the cloud (default: true).
    pub cloud_recording: bool,
}

impl Default for HostedRoomConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.daily.co/v1".into(),
            api_key: String::new(),
            request_timeout: Duration::from_secs(10),
            cloud_recording: true,
        }
    }
}

/// Settings for [`SignedTokenVideoProvider`](crate::SignedTokenVideoProvider).
#[derive(Debug, Clone)]
pub struct SignedTokenConfig {
    pub api_base_url: String,
    /// Public base under which rooms are reachable; the room name is
    /// appended.
    pub join_base_url: String,
    /// Account key id, used as the token issuer.
    pub api_key: String,
    /// Shared secret used to sign participant tokens.
    pub api_secret: String,
    pub request_timeout: Duration,
}

impl Default for SignedTokenConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            join_base_url: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Settings for [`HttpRegistryValidator`](crate::HttpRegistryValidator).
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub base_url: String,
    /// Sent as a bearer token when set.
    pub api_key: Option<String>,
    pub request_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8090".into(),
            api_key: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}
