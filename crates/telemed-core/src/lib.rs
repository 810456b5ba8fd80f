//! Telemedicine compliance core: domain models, state machines and the
//! contracts the orchestration services depend on.
//!
//! Every aggregate is tenant-scoped. Persistence, the video provider, the
//! registry validator and event delivery are abstracted behind traits in
//! [`repository`], [`provider`] and [`events`].

pub mod error;
pub mod events;
pub mod models;
pub mod provider;
pub mod repository;

pub use error::{TelemedError, TelemedResult};
