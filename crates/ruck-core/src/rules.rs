//! The standard rule set and its tunable weights.
//!
//! Scoring formulas are configuration: every constant a rule uses comes from
//! [`ScoringConfig`], which deserialises from the `[scoring]` table of the
//! application config with every field defaulted.
//!
//! Fact-driven metrics are folds. Each fact is folded into the value at most
//! once, tracked through [`Metric::computed_from_facts`], so re-applying a fact
//! returns the prior value unchanged. Metric-driven metrics are plain
//! functions of their dependencies' current values.
//!
//! [`Metric::computed_from_facts`]: crate::metric::Metric::computed_from_facts

use serde::{Deserialize, Serialize};

use crate::{
  Result,
  fact::{
    AppointmentOutcome, FactPayload, FactType, InjurySeverity, InjuryStatus,
  },
  graph::{Node, RuleGraph, RuleInput},
  metric::{AvailabilityStatus, MetricName, MetricValue},
};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttendanceWeights {
  pub missed_penalty: f64,
  pub attended_bonus: f64,
}

impl Default for AttendanceWeights {
  fn default() -> Self { Self { missed_penalty: 0.5, attended_bonus: 0.1 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MedicalWeights {
  pub missed_penalty:  f64,
  pub attended_bonus:  f64,
  pub minor_injury:    f64,
  pub moderate_injury: f64,
  pub severe_injury:   f64,
}

impl Default for MedicalWeights {
  fn default() -> Self {
    Self {
      missed_penalty:  0.5,
      attended_bonus:  0.2,
      minor_injury:    0.5,
      moderate_injury: 1.5,
      severe_injury:   3.0,
    }
  }
}

impl MedicalWeights {
  fn injury(&self, severity: InjurySeverity) -> f64 {
    match severity {
      InjurySeverity::Minor => self.minor_injury,
      InjurySeverity::Moderate => self.moderate_injury,
      InjurySeverity::Severe => self.severe_injury,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnessWeights {
  /// Weight of the newest session in the moving average (0–1).
  pub smoothing:           f64,
  pub per_km:              f64,
  pub per_100m_high_speed: f64,
  pub per_sprint:          f64,
}

impl Default for FitnessWeights {
  fn default() -> Self {
    Self {
      smoothing:           0.3,
      per_km:              0.8,
      per_100m_high_speed: 0.5,
      per_sprint:          0.1,
    }
  }
}

/// `intercept + slope * attendance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CohesionWeights {
  pub intercept: f64,
  pub slope:     f64,
}

impl Default for CohesionWeights {
  fn default() -> Self { Self { intercept: 1.74, slope: 0.8 } }
}

/// `base + per_point * (attendance + medical)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueWeights {
  pub base:      f64,
  pub per_point: f64,
}

impl Default for ValueWeights {
  fn default() -> Self { Self { base: 84_000.0, per_point: 3_500.0 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvailabilityThresholds {
  pub unavailable_below_medical: f64,
  pub modified_below_medical:    f64,
  pub modified_below_fitness:    f64,
}

impl Default for AvailabilityThresholds {
  fn default() -> Self {
    Self {
      unavailable_below_medical: 4.0,
      modified_below_medical:    6.0,
      modified_below_fitness:    4.0,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
  pub attendance:   AttendanceWeights,
  pub medical:      MedicalWeights,
  pub fitness:      FitnessWeights,
  pub cohesion:     CohesionWeights,
  pub value:        ValueWeights,
  pub availability: AvailabilityThresholds,
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Scores are kept to one decimal place so equal inputs compare equal.
fn score(n: f64) -> MetricValue {
  MetricValue::Number(((n * 10.0).round() / 10.0).clamp(0.0, 10.0))
}

fn currency(n: f64) -> MetricValue { MetricValue::Number(n.round().max(0.0)) }

// ─── Standard graph ──────────────────────────────────────────────────────────

/// Register the six standard rules.
pub fn standard_graph(config: &ScoringConfig) -> Result<RuleGraph> {
  let mut graph = RuleGraph::new();

  let weights = config.attendance.clone();
  graph.register_rule(
    MetricName::AttendanceScore,
    [Node::Fact(FactType::MedicalAppointmentOutcome)],
    move |input| attendance(input, &weights),
  )?;

  let weights = config.medical.clone();
  graph.register_rule(
    MetricName::MedicalScore,
    [
      Node::Fact(FactType::MedicalAppointmentOutcome),
      Node::Fact(FactType::InjuryEvent),
    ],
    move |input| medical(input, &weights),
  )?;

  let weights = config.fitness.clone();
  graph.register_rule(
    MetricName::FitnessRating,
    [Node::Fact(FactType::GpsSessionResult)],
    move |input| fitness(input, &weights),
  )?;

  let weights = config.cohesion.clone();
  graph.register_rule(
    MetricName::CohesionReliability,
    [Node::Metric(MetricName::AttendanceScore)],
    move |input| {
      let attendance = input.number(MetricName::AttendanceScore)?;
      Ok(score(weights.intercept + weights.slope * attendance))
    },
  )?;

  let weights = config.value.clone();
  graph.register_rule(
    MetricName::PlayerValue,
    [
      Node::Metric(MetricName::AttendanceScore),
      Node::Metric(MetricName::MedicalScore),
    ],
    move |input| {
      let points = input.number(MetricName::AttendanceScore)?
        + input.number(MetricName::MedicalScore)?;
      Ok(currency(weights.base + weights.per_point * points))
    },
  )?;

  let thresholds = config.availability.clone();
  graph.register_rule(
    MetricName::AvailabilityStatus,
    [
      Node::Metric(MetricName::MedicalScore),
      Node::Metric(MetricName::FitnessRating),
      Node::Fact(FactType::StatusDeclaration),
    ],
    move |input| availability(input, &thresholds),
  )?;

  Ok(graph)
}

// ─── Compute functions ───────────────────────────────────────────────────────

fn attendance(input: &RuleInput<'_>, w: &AttendanceWeights) -> Result<MetricValue, String> {
  let prior = input.prior_number()?;
  let Some(fact) = input.fact() else { return Ok(score(prior)) };
  if input.prior().includes(&fact.fact_id) {
    return Ok(input.prior().value);
  }
  let delta = match &fact.payload {
    FactPayload::MedicalAppointmentOutcome(v) => match v.outcome {
      AppointmentOutcome::Missed => -w.missed_penalty,
      AppointmentOutcome::Attended => w.attended_bonus,
      AppointmentOutcome::Rescheduled | AppointmentOutcome::Cancelled => 0.0,
    },
    _ => 0.0,
  };
  Ok(score(prior + delta))
}

fn medical(input: &RuleInput<'_>, w: &MedicalWeights) -> Result<MetricValue, String> {
  let prior = input.prior_number()?;
  let Some(fact) = input.fact() else { return Ok(score(prior)) };
  if input.prior().includes(&fact.fact_id) {
    return Ok(input.prior().value);
  }
  let delta = match &fact.payload {
    FactPayload::MedicalAppointmentOutcome(v) => match v.outcome {
      AppointmentOutcome::Missed => -w.missed_penalty,
      AppointmentOutcome::Attended => w.attended_bonus,
      AppointmentOutcome::Rescheduled | AppointmentOutcome::Cancelled => 0.0,
    },
    FactPayload::InjuryEvent(v) => match v.status {
      InjuryStatus::Active => -w.injury(v.severity),
      InjuryStatus::Cleared => w.injury(v.severity),
    },
    _ => 0.0,
  };
  Ok(score(prior + delta))
}

fn fitness(input: &RuleInput<'_>, w: &FitnessWeights) -> Result<MetricValue, String> {
  let prior = input.prior_number()?;
  let Some(fact) = input.fact() else { return Ok(score(prior)) };
  if input.prior().includes(&fact.fact_id) {
    return Ok(input.prior().value);
  }
  let FactPayload::GpsSessionResult(session) = &fact.payload else {
    return Ok(input.prior().value);
  };
  if !(session.distance_m.is_finite() && session.high_speed_m.is_finite())
    || session.distance_m < 0.0
    || session.high_speed_m < 0.0
  {
    return Err(format!(
      "session distances must be non-negative, got {} m / {} m high-speed",
      session.distance_m, session.high_speed_m
    ));
  }
  let session_score = (session.distance_m / 1000.0 * w.per_km
    + session.high_speed_m / 100.0 * w.per_100m_high_speed
    + f64::from(session.sprint_count) * w.per_sprint)
    .min(10.0);
  Ok(score(prior * (1.0 - w.smoothing) + session_score * w.smoothing))
}

fn availability(
  input: &RuleInput<'_>,
  t: &AvailabilityThresholds,
) -> Result<MetricValue, String> {
  if let Some(fact) = input.fact()
    && let FactPayload::StatusDeclaration(declared) = &fact.payload
  {
    return declared
      .status
      .parse::<AvailabilityStatus>()
      .map(MetricValue::Status)
      .map_err(|e| e.to_string());
  }

  let medical = input.number(MetricName::MedicalScore)?;
  let fitness = input.number(MetricName::FitnessRating)?;
  let status = if medical < t.unavailable_below_medical {
    AvailabilityStatus::Unavailable
  } else if medical < t.modified_below_medical || fitness < t.modified_below_fitness {
    AvailabilityStatus::Modified
  } else {
    AvailabilityStatus::Available
  };
  Ok(MetricValue::Status(status))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn standard_graph_orders_direct_dependents_first() {
    let g = standard_graph(&ScoringConfig::default()).unwrap();
    assert!(g.validate().is_ok());
    assert_eq!(
      g.compute_order_from(FactType::MedicalAppointmentOutcome),
      vec![
        MetricName::AttendanceScore,
        MetricName::MedicalScore,
        MetricName::CohesionReliability,
        MetricName::PlayerValue,
        MetricName::AvailabilityStatus,
      ]
    );
    assert_eq!(
      g.compute_order_from(FactType::GpsSessionResult),
      vec![MetricName::FitnessRating, MetricName::AvailabilityStatus]
    );
  }

  #[test]
  fn baseline_is_consistent_with_rules() {
    let g = standard_graph(&ScoringConfig::default()).unwrap();
    let s = g.baseline("p-01").unwrap();
    // 1.74 + 0.8 * 10.0
    assert_eq!(s.value(MetricName::CohesionReliability), MetricValue::Number(9.7));
    // 84000 + 3500 * 20
    assert_eq!(s.value(MetricName::PlayerValue), MetricValue::Number(154_000.0));
    assert_eq!(
      s.value(MetricName::AvailabilityStatus),
      MetricValue::Status(AvailabilityStatus::Available)
    );
  }

  #[test]
  fn seeded_snapshot_derives_unseeded_metrics() {
    let g = standard_graph(&ScoringConfig::default()).unwrap();
    let s = g
      .seeded(
        "p-02",
        [(MetricName::AttendanceScore, MetricValue::Number(5.0))].into(),
      )
      .unwrap();
    assert_eq!(s.value(MetricName::AttendanceScore), MetricValue::Number(5.0));
    // 1.74 + 0.8 * 5.0
    assert_eq!(s.value(MetricName::CohesionReliability), MetricValue::Number(5.7));
    // 84000 + 3500 * 15
    assert_eq!(s.value(MetricName::PlayerValue), MetricValue::Number(136_500.0));
  }

  #[test]
  fn seeded_derived_metric_must_agree_with_its_rule() {
    let g = standard_graph(&ScoringConfig::default()).unwrap();
    let err = g
      .seeded(
        "p-02",
        [
          (MetricName::AttendanceScore, MetricValue::Number(5.0)),
          (MetricName::CohesionReliability, MetricValue::Number(9.7)),
        ]
        .into(),
      )
      .unwrap_err();
    assert!(matches!(
      err,
      crate::Error::SeedMismatch { metric: MetricName::CohesionReliability, .. }
    ));

    // A declared status is a fact-driven state and is kept as given.
    let s = g
      .seeded(
        "p-02",
        [(
          MetricName::AvailabilityStatus,
          MetricValue::Status(AvailabilityStatus::Unavailable),
        )]
        .into(),
      )
      .unwrap();
    assert_eq!(
      s.value(MetricName::AvailabilityStatus),
      MetricValue::Status(AvailabilityStatus::Unavailable)
    );
  }

  #[test]
  fn scoring_config_fills_missing_fields() {
    let cfg: ScoringConfig =
      serde_json::from_str(r#"{ "value": { "per_point": 4000.0 } }"#).unwrap();
    assert_eq!(cfg.value.per_point, 4000.0);
    assert_eq!(cfg.value.base, 84_000.0);
    assert_eq!(cfg.attendance, AttendanceWeights::default());
  }

  #[test]
  fn score_rounds_and_clamps() {
    assert_eq!(score(9.2 - 0.5), MetricValue::Number(8.7));
    assert_eq!(score(10.04), MetricValue::Number(10.0));
    assert_eq!(score(-0.3), MetricValue::Number(0.0));
  }
}
