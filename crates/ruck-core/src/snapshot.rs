//! The full set of a player's current metric values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator as _;

use crate::metric::{Metric, MetricName, MetricValue};

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// One entry per [`MetricName`], always present.
///
/// Metrics missing from serialised input are filled with their defaults, so
/// the invariant holds for every constructed or deserialised snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SnapshotRepr")]
pub struct MetricSnapshot {
  player_id: String,
  metrics:   BTreeMap<MetricName, Metric>,
}

#[derive(Deserialize)]
struct SnapshotRepr {
  player_id: String,
  #[serde(default)]
  metrics:   BTreeMap<MetricName, Metric>,
}

impl From<SnapshotRepr> for MetricSnapshot {
  fn from(repr: SnapshotRepr) -> Self {
    let mut snapshot = Self::new(repr.player_id);
    for (name, metric) in repr.metrics {
      snapshot.metrics.insert(name, metric);
    }
    snapshot
  }
}

impl MetricSnapshot {
  /// Every metric at its default value.
  pub fn new(player_id: impl Into<String>) -> Self {
    let player_id = player_id.into();
    let metrics = MetricName::iter()
      .map(|name| (name, Metric::initial(name, player_id.clone())))
      .collect();
    Self { player_id, metrics }
  }

  /// Defaults overlaid with `values`; used to enrol a player whose scores were
  /// assessed before they entered the system.
  pub fn from_values(
    player_id: impl Into<String>,
    values: impl IntoIterator<Item = (MetricName, MetricValue)>,
  ) -> Self {
    let mut snapshot = Self::new(player_id);
    for (name, value) in values {
      if let Some(metric) = snapshot.metrics.get_mut(&name) {
        metric.value = value;
      }
    }
    snapshot
  }

  pub fn player_id(&self) -> &str { &self.player_id }

  pub fn metric(&self, name: MetricName) -> &Metric {
    // Every constructor populates all names.
    &self.metrics[&name]
  }

  pub fn value(&self, name: MetricName) -> MetricValue { self.metric(name).value }

  pub fn iter(&self) -> impl Iterator<Item = &Metric> { self.metrics.values() }

  /// Replace one metric. The metric must belong to this snapshot's player.
  pub(crate) fn set(&mut self, metric: Metric) {
    debug_assert_eq!(metric.player_id, self.player_id);
    self.metrics.insert(metric.name, metric);
  }

  /// Project to the boundary shape: metric name to bare value.
  pub fn values(&self) -> BTreeMap<MetricName, MetricValue> {
    self.metrics.iter().map(|(name, m)| (*name, m.value)).collect()
  }

  /// Metrics whose value differs between `self` and `other`, in metric order.
  /// Provenance fields are ignored.
  pub fn diff(&self, other: &MetricSnapshot) -> SnapshotDiff {
    let deltas = self
      .metrics
      .iter()
      .filter_map(|(name, before)| {
        let after = other.value(*name);
        (before.value != after).then_some(MetricDelta {
          metric: *name,
          before: before.value,
          after,
        })
      })
      .collect();
    SnapshotDiff { deltas }
  }
}

// ─── Diff ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
  pub metric: MetricName,
  pub before: MetricValue,
  pub after:  MetricValue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDiff {
  pub deltas: Vec<MetricDelta>,
}

impl SnapshotDiff {
  pub fn is_empty(&self) -> bool { self.deltas.is_empty() }
}
