//! Concrete clients for the external services the telemedicine core
//! talks to.
//!
//! - [`HostedRoomVideoProvider`]: rooms and join tokens are issued by the
//!   provider's REST API, which also returns the room URL.
//! - [`SignedTokenVideoProvider`]: rooms are managed over REST, join
//!   tokens are HS256 JWTs signed locally with the account secret.
//! - [`HttpRegistryValidator`]: license and national-id lookups against a
//!   national registry.

pub mod config;
mod error;
mod hosted;
mod registry;
mod signed;

pub use config::{HostedRoomConfig, RegistryConfig, SignedTokenConfig};
pub use error::ProviderError;
pub use hosted::HostedRoomVideoProvider;
pub use registry::HttpRegistryValidator;
pub use signed::{ParticipantClaims, SignedTokenVideoProvider, VideoGrant};
