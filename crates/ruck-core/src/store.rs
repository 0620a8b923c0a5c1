//! The `CascadeStore` trait and the types that cross it.
//!
//! Storage backends (e.g. `ruck-store-sqlite`) implement the trait. The engine
//! never calls it; loading and committing happen around a cascade, in the
//! service layer.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  audit::{AuditTrail, ChangeRecord},
  fact::{Fact, FactId},
  snapshot::MetricSnapshot,
};

/// A player's current snapshot and the version it was stored at.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSnapshot {
  pub snapshot: MetricSnapshot,
  /// Incremented by every commit; `0` straight after enrolment.
  pub version:  u64,
}

/// A fact as persisted, with the server-assigned recording time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFact {
  pub fact:        Fact,
  pub recorded_at: DateTime<Utc>,
}

/// Everything one cascade writes, committed as a unit.
#[derive(Debug, Clone)]
pub struct CascadeCommit {
  pub fact:             Fact,
  pub snapshot:         MetricSnapshot,
  pub changes:          Vec<ChangeRecord>,
  /// The version the cascade read. The commit fails if the stored version
  /// has moved on since.
  pub expected_version: u64,
  /// Set when the player is enrolled by this commit; written in the same
  /// transaction, and `expected_version` must then be `0`.
  pub genesis:          Option<MetricSnapshot>,
}

/// Abstraction over a Ruck storage backend.
///
/// Facts and change records are append-only. The snapshot row is the only
/// state that is overwritten, and only under a version check.
pub trait CascadeStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Create the snapshot row and audit genesis for a new player. Returns an
  /// error if the player already exists.
  fn enroll<'a>(
    &'a self,
    genesis: &'a MetricSnapshot,
  ) -> impl Future<Output = Result<StoredSnapshot, Self::Error>> + Send + 'a;

  /// The player's current snapshot, or `None` if the player is unknown.
  fn load_snapshot<'a>(
    &'a self,
    player_id: &'a str,
  ) -> impl Future<Output = Result<Option<StoredSnapshot>, Self::Error>> + Send + 'a;

  /// Atomically enrol the player if `genesis` is set, record the fact (a
  /// no-op if its id is already stored), replace the snapshot, and append the
  /// change records. Returns the new version.
  fn commit(
    &self,
    commit: CascadeCommit,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// The genesis snapshot and every change record, in insertion order.
  fn load_audit_trail<'a>(
    &'a self,
    player_id: &'a str,
  ) -> impl Future<Output = Result<Option<AuditTrail>, Self::Error>> + Send + 'a;

  fn get_fact<'a>(
    &'a self,
    fact_id: &'a FactId,
  ) -> impl Future<Output = Result<Option<StoredFact>, Self::Error>> + Send + 'a;

  /// All recorded facts for a player, oldest first.
  fn list_facts<'a>(
    &'a self,
    player_id: &'a str,
  ) -> impl Future<Output = Result<Vec<StoredFact>, Self::Error>> + Send + 'a;

  fn list_players(
    &self,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;
}
