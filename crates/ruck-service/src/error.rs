//! Service error type.

use thiserror::Error;

/// An error returned by a [`CascadeService`](crate::CascadeService) call.
#[derive(Debug, Error)]
pub enum ServiceError {
  #[error("not found: {0}")]
  NotFound(String),

  /// The submitted mutation or seed values could not be interpreted.
  #[error("bad request: {0}")]
  BadRequest(String),

  /// The cascade failed; nothing was committed.
  #[error("update not applied: {0}")]
  Rejected(#[source] ruck_core::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ServiceError {
  pub(crate) fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = ServiceError> = std::result::Result<T, E>;
