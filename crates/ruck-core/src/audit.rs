//! Change records and the per-player audit trail.
//!
//! Records are produced only by cascades and are never edited, reordered, or
//! removed. Replaying them over the trail's genesis snapshot reconstructs the
//! player's metrics at any past instant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  fact::FactId,
  metric::{Metric, MetricName, MetricValue},
  snapshot::MetricSnapshot,
};

// ─── ChangeRecord ────────────────────────────────────────────────────────────

/// One metric's before/after value from one cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
  pub metric:       MetricName,
  pub player_id:    String,
  pub before:       MetricValue,
  pub after:        MetricValue,
  /// The fact whose cascade produced this change.
  pub triggered_by: FactId,
  /// Parent metrics whose change caused this recomputation; empty when the
  /// metric depends on the fact directly.
  #[serde(default)]
  pub via:          Vec<MetricName>,
  /// `recorded_by` of the triggering fact.
  pub actor:        String,
  pub timestamp:    DateTime<Utc>,
}

// ─── AuditTrail ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditTrail {
  player_id: String,
  /// The snapshot the player's first cascade started from.
  genesis:   MetricSnapshot,
  records:   Vec<ChangeRecord>,
}

impl AuditTrail {
  pub fn new(genesis: MetricSnapshot) -> Self {
    Self {
      player_id: genesis.player_id().to_owned(),
      genesis,
      records: Vec::new(),
    }
  }

  pub fn player_id(&self) -> &str { &self.player_id }

  pub fn genesis(&self) -> &MetricSnapshot { &self.genesis }

  pub fn records(&self) -> &[ChangeRecord] { &self.records }

  pub fn len(&self) -> usize { self.records.len() }

  pub fn is_empty(&self) -> bool { self.records.is_empty() }

  /// Append one cascade's records. All or nothing: if any record belongs to
  /// another player, nothing is appended.
  pub fn append(&mut self, records: Vec<ChangeRecord>) -> Result<()> {
    if let Some(stray) = records.iter().find(|r| r.player_id != self.player_id) {
      return Err(Error::PlayerMismatch {
        expected: self.player_id.clone(),
        found:    stray.player_id.clone(),
      });
    }
    self.records.extend(records);
    Ok(())
  }

  pub fn records_for(
    &self,
    metric: MetricName,
  ) -> impl Iterator<Item = &ChangeRecord> + '_ {
    self.records.iter().filter(move |r| r.metric == metric)
  }

  /// Replay every record stamped at or before `as_of`, in recorded order,
  /// over the genesis snapshot. Provenance is rebuilt the way the engine
  /// builds it: each changed metric gains the fact that changed it.
  pub fn reconstruct_snapshot(&self, as_of: DateTime<Utc>) -> MetricSnapshot {
    let mut snapshot = self.genesis.clone();
    for record in self.records.iter().filter(|r| r.timestamp <= as_of) {
      let prior = snapshot.metric(record.metric);
      let mut computed_from_facts = prior.computed_from_facts.clone();
      computed_from_facts.insert(record.triggered_by.clone());
      let metric = Metric {
        value: record.after,
        computed_at: Some(record.timestamp),
        computed_from_facts,
        ..prior.clone()
      };
      snapshot.set(metric);
    }
    snapshot
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};

  use super::*;

  fn record(metric: MetricName, after: f64, at: DateTime<Utc>) -> ChangeRecord {
    ChangeRecord {
      metric,
      player_id: "p-09".into(),
      before: 0.0.into(),
      after: after.into(),
      triggered_by: FactId::new(format!("fact-{after}")),
      via: vec![],
      actor: "coach".into(),
      timestamp: at,
    }
  }

  #[test]
  fn append_rejects_foreign_records_atomically() {
    let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let mut trail = AuditTrail::new(MetricSnapshot::new("p-09"));

    let mut foreign = record(MetricName::MedicalScore, 8.0, t0);
    foreign.player_id = "p-10".into();
    let err = trail
      .append(vec![record(MetricName::AttendanceScore, 9.5, t0), foreign])
      .unwrap_err();
    assert!(matches!(err, Error::PlayerMismatch { .. }));
    assert!(trail.is_empty());
  }

  #[test]
  fn reconstruct_replays_up_to_as_of() {
    let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let t1 = t0 + Duration::days(1);
    let t2 = t0 + Duration::days(2);

    let mut trail = AuditTrail::new(MetricSnapshot::new("p-09"));
    trail.append(vec![record(MetricName::AttendanceScore, 9.5, t0)]).unwrap();
    trail
      .append(vec![
        record(MetricName::AttendanceScore, 9.0, t1),
        record(MetricName::MedicalScore, 8.5, t1),
      ])
      .unwrap();
    trail.append(vec![record(MetricName::AttendanceScore, 8.5, t2)]).unwrap();

    let before_any = trail.reconstruct_snapshot(t0 - Duration::seconds(1));
    assert_eq!(before_any, *trail.genesis());

    let at_t1 = trail.reconstruct_snapshot(t1);
    assert_eq!(at_t1.value(MetricName::AttendanceScore), MetricValue::Number(9.0));
    assert_eq!(at_t1.value(MetricName::MedicalScore), MetricValue::Number(8.5));
    assert_eq!(at_t1.metric(MetricName::AttendanceScore).computed_at, Some(t1));

    let latest = trail.reconstruct_snapshot(t2);
    assert_eq!(latest.value(MetricName::AttendanceScore), MetricValue::Number(8.5));
    assert_eq!(trail.records_for(MetricName::AttendanceScore).count(), 3);
  }
}
