//! The cascade engine: one fact in, an updated snapshot and its change
//! records out.
//!
//! Each call is a pure function of `(fact, snapshot)`. The engine works on a
//! private copy of the snapshot, so a failed cascade leaves nothing behind.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::{
  Error, Result,
  audit::ChangeRecord,
  fact::Fact,
  graph::{Node, RuleGraph, RuleInput},
  metric::{Metric, MetricName, MetricValue},
  snapshot::MetricSnapshot,
};

// ─── Output ──────────────────────────────────────────────────────────────────

/// The result of one successful cascade.
#[derive(Debug, Clone, PartialEq)]
pub struct Cascade {
  pub snapshot: MetricSnapshot,
  /// In recomputation order; empty when the fact changed nothing.
  pub changes:  Vec<ChangeRecord>,
}

impl Cascade {
  pub fn is_noop(&self) -> bool { self.changes.is_empty() }

  /// The boundary shape handed to callers.
  pub fn report(&self) -> CascadeReport {
    CascadeReport {
      snapshot: self.snapshot.values(),
      changes:  self.changes.clone(),
    }
  }
}

/// `{ snapshot: {MetricName: value}, changes: [...] }` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeReport {
  pub snapshot: BTreeMap<MetricName, MetricValue>,
  pub changes:  Vec<ChangeRecord>,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CascadeEngine {
  graph: RuleGraph,
}

impl CascadeEngine {
  /// Wrap a fully-registered graph. Fails if any rule depends on a metric
  /// that has no rule.
  pub fn new(graph: RuleGraph) -> Result<Self> {
    graph.validate()?;
    Ok(Self { graph })
  }

  pub fn graph(&self) -> &RuleGraph { &self.graph }

  /// See [`RuleGraph::baseline`].
  pub fn baseline(&self, player_id: impl Into<String>) -> Result<MetricSnapshot> {
    self.graph.baseline(player_id)
  }

  /// Apply `fact` to `snapshot`, stamping changes with the current time.
  pub fn apply_fact(&self, fact: &Fact, snapshot: &MetricSnapshot) -> Result<Cascade> {
    self.apply_fact_at(fact, snapshot, Utc::now())
  }

  /// Apply `fact` to `snapshot`, stamping changes with `now`.
  ///
  /// Every metric downstream of the fact's type is visited once, in
  /// topological order. A metric is recomputed only when it depends on the
  /// fact directly or on a metric that changed earlier in this cascade; an
  /// unchanged value ends propagation along that path.
  pub fn apply_fact_at(
    &self,
    fact: &Fact,
    snapshot: &MetricSnapshot,
    now: DateTime<Utc>,
  ) -> Result<Cascade> {
    if fact.player_id != snapshot.player_id() {
      return Err(Error::PlayerMismatch {
        expected: snapshot.player_id().to_owned(),
        found:    fact.player_id.clone(),
      });
    }

    let source = Node::Fact(fact.fact_type());
    let order = self.graph.compute_order_from(source);
    debug!(
      fact_id = %fact.fact_id,
      fact_type = %fact.fact_type(),
      affected = order.len(),
      "starting cascade"
    );

    let mut working = snapshot.clone();
    let mut changed: BTreeSet<MetricName> = BTreeSet::new();
    let mut completed: Vec<MetricName> = Vec::new();
    let mut changes: Vec<ChangeRecord> = Vec::new();

    for name in order {
      let Some(rule) = self.graph.rule(name) else { continue };

      let direct = rule.depends_on_node(source);
      let via: Vec<MetricName> =
        rule.metric_dependencies().filter(|d| changed.contains(d)).collect();
      if !direct && via.is_empty() {
        trace!(metric = %name, "no dependency changed; skipping");
        continue;
      }

      let prior = working.metric(name).clone();
      let input = RuleInput::new(&prior, direct.then_some(fact), &working, &rule.depends_on);
      let after = match rule.compute(&input).and_then(|v| name.check(v)) {
        Ok(v) => v,
        Err(cause) => {
          warn!(fact_id = %fact.fact_id, metric = %name, %cause, "metric computation failed");
          return Err(Error::MetricCompute {
            fact_id: fact.fact_id.clone(),
            metric: name,
            cause,
            completed,
          });
        }
      };
      completed.push(name);

      if after == prior.value {
        debug!(metric = %name, value = %after, "unchanged");
        continue;
      }

      debug!(metric = %name, before = %prior.value, %after, "changed");
      // Only facts that moved this metric; ancestors keep their own sets.
      let mut computed_from_facts = prior.computed_from_facts.clone();
      computed_from_facts.insert(fact.fact_id.clone());

      changes.push(ChangeRecord {
        metric: name,
        player_id: fact.player_id.clone(),
        before: prior.value,
        after,
        triggered_by: fact.fact_id.clone(),
        via,
        actor: fact.recorded_by.clone(),
        timestamp: now,
      });
      working.set(Metric {
        value: after,
        computed_at: Some(now),
        computed_from_facts,
        ..prior
      });
      changed.insert(name);
    }

    Ok(Cascade { snapshot: working, changes })
  }
}
