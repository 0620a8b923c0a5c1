//! Error types for `ruck-core`.

use thiserror::Error;

use crate::{
  fact::FactId,
  metric::{MetricName, MetricValue},
};

#[derive(Debug, Error)]
pub enum Error {
  // ── Rule graph configuration ──────────────────────────────────────────

  #[error("a rule for {0} is already registered")]
  DuplicateRule(MetricName),

  /// `cycle` holds every metric left unordered by the topological sort: the
  /// cycle itself plus anything downstream of it.
  #[error("rule for {target} would create a dependency cycle through {cycle:?}")]
  CyclicDependency {
    target: MetricName,
    cycle:  Vec<MetricName>,
  },

  #[error("{dependent} depends on {missing}, which has no registered rule")]
  UnresolvedDependency {
    dependent: MetricName,
    missing:   MetricName,
  },

  // ── Computation ───────────────────────────────────────────────────────

  /// A compute function failed or produced a value outside its metric's
  /// domain. `completed` lists the metrics recomputed before the failure;
  /// none of them were committed.
  #[error("computing {metric} for fact {fact_id} failed: {cause}")]
  MetricCompute {
    fact_id:   FactId,
    metric:    MetricName,
    cause:     String,
    completed: Vec<MetricName>,
  },

  #[error("computing baseline {metric} failed: {cause}")]
  Baseline { metric: MetricName, cause: String },

  /// A seed for a metric derived only from other metrics must equal what
  /// its rule gives for the seeded inputs.
  #[error("seeded {metric} = {seeded} but its rule gives {derived}")]
  SeedMismatch {
    metric:  MetricName,
    seeded:  MetricValue,
    derived: MetricValue,
  },

  // ── Input ─────────────────────────────────────────────────────────────

  #[error("expected records for player {expected:?}, found {found:?}")]
  PlayerMismatch { expected: String, found: String },

  #[error("unknown fact type: {0:?}")]
  UnknownFactType(String),

  #[error("unknown metric: {0:?}")]
  UnknownMetric(String),

  #[error("unknown availability status: {0:?}")]
  UnknownStatus(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
