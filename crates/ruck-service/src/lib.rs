//! Boundary layer for Ruck.
//!
//! [`CascadeService`] ties a [`CascadeEngine`] to any
//! [`ruck_core::store::CascadeStore`]: it loads a player's snapshot, runs the
//! cascade, and commits the result, holding that player's lock throughout.
//! Transport concerns (HTTP, auth) are the caller's responsibility.
//!
//! [`CascadeEngine`]: ruck_core::engine::CascadeEngine

pub mod error;
pub mod locks;
pub mod service;

pub use error::{Result, ServiceError};
pub use locks::PlayerLocks;
pub use service::{CascadeService, Enrollment};
