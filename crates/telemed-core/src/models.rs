//! Domain models for the telemedicine compliance core.
//!
//! Aggregates keep their fields private; each exposes transition methods
//! as its only mutation surface and a flat `*Record` type for storage.

pub mod consent;
pub mod encounter;
pub mod identity;
pub mod recording;
pub mod session;
