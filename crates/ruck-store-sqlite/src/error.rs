//! Error type for `ruck-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] ruck_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored column held something the domain types reject.
  #[error("corrupt row: {0}")]
  Decode(String),

  #[error("player {0:?} is already enrolled")]
  AlreadyEnrolled(String),

  #[error("player {0:?} is not enrolled")]
  UnknownPlayer(String),

  /// The snapshot moved on between load and commit.
  #[error(
    "snapshot for {player_id:?} is at version {found}, commit expected {expected}"
  )]
  Conflict {
    player_id: String,
    expected:  u64,
    found:     u64,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
