//! Derived metrics and their values.

use std::{collections::BTreeSet, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{Error, Result, fact::FactId};

// ─── Availability ────────────────────────────────────────────────────────────

/// Whether a player can be selected, as a closed set of states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityStatus {
  Available,
  /// Available with a restricted load or role.
  Modified,
  Unavailable,
}

impl AvailabilityStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Available => "available",
      Self::Modified => "modified",
      Self::Unavailable => "unavailable",
    }
  }
}

impl fmt::Display for AvailabilityStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Maps the whole (trimmed, case-folded) token. Text that is not in the table
/// is rejected rather than guessed at.
impl FromStr for AvailabilityStatus {
  type Err = Error;

  fn from_str(raw: &str) -> Result<Self> {
    match raw.trim().to_ascii_lowercase().as_str() {
      "available" | "fit" | "cleared" | "full" => Ok(Self::Available),
      "modified" | "limited" | "restricted" | "partial" => Ok(Self::Modified),
      "unavailable" | "injured" | "out" | "suspended" => Ok(Self::Unavailable),
      _ => Err(Error::UnknownStatus(raw.to_owned())),
    }
  }
}

// ─── MetricName ──────────────────────────────────────────────────────────────

/// Every metric owned by the cascade engine. Declaration order is the
/// iteration order of a snapshot.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  IntoStaticStr,
)]
pub enum MetricName {
  AttendanceScore,
  MedicalScore,
  FitnessRating,
  CohesionReliability,
  PlayerValue,
  AvailabilityStatus,
}

impl MetricName {
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownMetric(s.to_owned()))
  }

  pub fn as_str(&self) -> &'static str { self.into() }

  /// The value a metric holds before any rule has run for the player.
  pub fn default_value(&self) -> MetricValue {
    match self {
      Self::AttendanceScore | Self::MedicalScore | Self::CohesionReliability => {
        MetricValue::Number(10.0)
      }
      Self::FitnessRating => MetricValue::Number(5.0),
      Self::PlayerValue => MetricValue::Number(0.0),
      Self::AvailabilityStatus => {
        MetricValue::Status(AvailabilityStatus::Available)
      }
    }
  }

  /// Reject values outside this metric's domain.
  pub fn check(&self, value: MetricValue) -> Result<MetricValue, String> {
    match (self, value) {
      (Self::AvailabilityStatus, MetricValue::Status(_)) => Ok(value),
      (Self::AvailabilityStatus, MetricValue::Number(n)) => {
        Err(format!("expected an availability status, got number {n}"))
      }
      (_, MetricValue::Status(s)) => {
        Err(format!("expected a number, got status {s}"))
      }
      (_, MetricValue::Number(n)) if !n.is_finite() => {
        Err(format!("non-finite value {n}"))
      }
      (Self::PlayerValue, MetricValue::Number(n)) if n < 0.0 => {
        Err(format!("player value {n} is negative"))
      }
      (Self::PlayerValue, MetricValue::Number(_)) => Ok(value),
      (_, MetricValue::Number(n)) if !(0.0..=10.0).contains(&n) => {
        Err(format!("score {n} is outside 0-10"))
      }
      (_, MetricValue::Number(_)) => Ok(value),
    }
  }
}

// ─── MetricValue ─────────────────────────────────────────────────────────────

/// A metric's value: a bare number or a bare status string on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
  Number(f64),
  Status(AvailabilityStatus),
}

impl MetricValue {
  pub fn as_number(&self) -> Option<f64> {
    match self {
      Self::Number(n) => Some(*n),
      Self::Status(_) => None,
    }
  }

  pub fn as_status(&self) -> Option<AvailabilityStatus> {
    match self {
      Self::Status(s) => Some(*s),
      Self::Number(_) => None,
    }
  }
}

impl From<f64> for MetricValue {
  fn from(n: f64) -> Self { Self::Number(n) }
}

impl From<AvailabilityStatus> for MetricValue {
  fn from(s: AvailabilityStatus) -> Self { Self::Status(s) }
}

impl fmt::Display for MetricValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Number(n) => write!(f, "{n}"),
      Self::Status(s) => write!(f, "{s}"),
    }
  }
}

// ─── Metric ──────────────────────────────────────────────────────────────────

/// One derived value for one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
  pub name:                MetricName,
  pub player_id:           String,
  pub value:               MetricValue,
  /// `None` until a cascade first changes the value.
  pub computed_at:         Option<DateTime<Utc>>,
  /// Facts whose effect is folded into the current value.
  #[serde(default)]
  pub computed_from_facts: BTreeSet<FactId>,
}

impl Metric {
  /// A metric holding its default value.
  pub fn initial(name: MetricName, player_id: impl Into<String>) -> Self {
    Self {
      name,
      player_id: player_id.into(),
      value: name.default_value(),
      computed_at: None,
      computed_from_facts: BTreeSet::new(),
    }
  }

  /// Whether `fact_id` has already been folded into this value.
  pub fn includes(&self, fact_id: &FactId) -> bool {
    self.computed_from_facts.contains(fact_id)
  }
}
