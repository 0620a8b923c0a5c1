//! Fact types: the raw, independently-sourced observations about a player.
//!
//! A fact is never updated once recorded. A correction is a new fact with
//! different content, and therefore a different [`FactId`].

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{Error, Result};

// ─── Fact type ───────────────────────────────────────────────────────────────

/// The discriminant of a [`FactPayload`]; also a node in the rule graph.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FactType {
  MedicalAppointmentOutcome,
  GpsSessionResult,
  InjuryEvent,
  StatusDeclaration,
}

impl FactType {
  /// Parse a wire discriminant such as `"injury_event"`.
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownFactType(s.to_owned()))
  }

  pub fn as_str(&self) -> &'static str { self.into() }
}

// ─── Payload sub-types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentOutcome {
  Attended,
  Missed,
  Rescheduled,
  Cancelled,
}

/// The result of a scheduled medical or physio appointment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentOutcomeValue {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub appointment_id: Option<String>,
  pub outcome:        AppointmentOutcome,
}

/// Load figures from one GPS-tracked training session or match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsSessionValue {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub session_id:   Option<String>,
  /// Total distance covered, in metres.
  pub distance_m:   f64,
  /// Distance covered above the high-speed running threshold, in metres.
  #[serde(default)]
  pub high_speed_m: f64,
  #[serde(default)]
  pub sprint_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjurySeverity {
  Minor,
  Moderate,
  Severe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjuryStatus {
  /// The injury has been diagnosed and is being managed.
  Active,
  /// The player has been cleared of this injury.
  Cleared,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjuryValue {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub injury_id: Option<String>,
  pub severity:  InjurySeverity,
  pub status:    InjuryStatus,
}

/// A free-text availability status entered by medical staff. The text is
/// mapped onto [`crate::metric::AvailabilityStatus`] when the fact cascades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusDeclarationValue {
  pub status: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub note:   Option<String>,
}

// ─── FactPayload ─────────────────────────────────────────────────────────────

/// The typed payload of a fact. The variant name doubles as the `fact_type`
/// discriminant on the wire and in storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum FactPayload {
  MedicalAppointmentOutcome(AppointmentOutcomeValue),
  GpsSessionResult(GpsSessionValue),
  InjuryEvent(InjuryValue),
  StatusDeclaration(StatusDeclarationValue),
}

impl FactPayload {
  /// Must match the `rename_all = "snake_case"` serde tags above.
  pub fn fact_type(&self) -> FactType {
    match self {
      Self::MedicalAppointmentOutcome(_) => FactType::MedicalAppointmentOutcome,
      Self::GpsSessionResult(_) => FactType::GpsSessionResult,
      Self::InjuryEvent(_) => FactType::InjuryEvent,
      Self::StatusDeclaration(_) => FactType::StatusDeclaration,
    }
  }

  /// Serialise the inner payload without the type tag.
  pub fn to_json(&self) -> Result<serde_json::Value> {
    // The full serialised form is `{"type": "...", "data": <payload>}`.
    let full = serde_json::to_value(self)?;
    Ok(full.get("data").cloned().unwrap_or(serde_json::Value::Null))
  }

  /// Rebuild a payload from its discriminant and inner JSON.
  pub fn from_parts(fact_type: FactType, data: serde_json::Value) -> Result<Self> {
    let wrapped = serde_json::json!({ "type": fact_type.as_str(), "data": data });
    Ok(serde_json::from_value(wrapped)?)
  }
}

// ─── FactId ──────────────────────────────────────────────────────────────────

/// Content address of a fact: hex SHA-256 over its canonical JSON form.
///
/// Two submissions of the same observation hash to the same id, which is how
/// re-applying a fact is recognised as a no-op.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactId(String);

impl FactId {
  /// Wrap an id read back from storage.
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  pub fn as_str(&self) -> &str { &self.0 }

  fn derive(
    player_id: &str,
    payload: &FactPayload,
    occurred_at: DateTime<Utc>,
    recorded_by: &str,
  ) -> Result<Self> {
    // serde_json maps are key-sorted, so this rendering is canonical.
    let canonical = serde_json::json!({
      "fact_type":   payload.fact_type().as_str(),
      "player_id":   player_id,
      "payload":     payload.to_json()?,
      "occurred_at": occurred_at.to_rfc3339(),
      "recorded_by": recorded_by,
    });
    let digest = Sha256::digest(canonical.to_string().as_bytes());
    Ok(Self(hex::encode(digest)))
  }
}

impl fmt::Display for FactId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Fact ────────────────────────────────────────────────────────────────────

/// An immutable observation about a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
  pub fact_id:     FactId,
  pub player_id:   String,
  pub payload:     FactPayload,
  /// When the observation happened in the real world.
  pub occurred_at: DateTime<Utc>,
  /// The person or system that recorded the observation.
  pub recorded_by: String,
}

impl Fact {
  pub fn new(
    player_id: impl Into<String>,
    payload: FactPayload,
    occurred_at: DateTime<Utc>,
    recorded_by: impl Into<String>,
  ) -> Result<Self> {
    let player_id = player_id.into();
    let recorded_by = recorded_by.into();
    let fact_id = FactId::derive(&player_id, &payload, occurred_at, &recorded_by)?;
    Ok(Self { fact_id, player_id, payload, occurred_at, recorded_by })
  }

  pub fn fact_type(&self) -> FactType { self.payload.fact_type() }
}

// ─── FactMutation ────────────────────────────────────────────────────────────

/// Boundary input: a fact as submitted by an external caller, with an untyped
/// discriminant and payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactMutation {
  pub fact_type:   String,
  pub player_id:   String,
  pub payload:     serde_json::Value,
  pub occurred_at: DateTime<Utc>,
  pub recorded_by: String,
}

impl FactMutation {
  /// Validate the discriminant and payload and assign the content id.
  pub fn into_fact(self) -> Result<Fact> {
    let fact_type = FactType::parse(&self.fact_type)?;
    let payload = FactPayload::from_parts(fact_type, self.payload)?;
    Fact::new(self.player_id, payload, self.occurred_at, self.recorded_by)
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn missed() -> FactMutation {
    FactMutation {
      fact_type:   "medical_appointment_outcome".into(),
      player_id:   "p-07".into(),
      payload:     serde_json::json!({ "appointment_id": "physio-12", "outcome": "missed" }),
      occurred_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
      recorded_by: "dr.hale".into(),
    }
  }

  #[test]
  fn mutation_parses_into_typed_payload() {
    let fact = missed().into_fact().unwrap();
    assert_eq!(fact.fact_type(), FactType::MedicalAppointmentOutcome);
    assert!(matches!(
      fact.payload,
      FactPayload::MedicalAppointmentOutcome(AppointmentOutcomeValue {
        outcome: AppointmentOutcome::Missed,
        ..
      })
    ));
  }

  #[test]
  fn identical_mutations_share_an_id() {
    let a = missed().into_fact().unwrap();
    let b = missed().into_fact().unwrap();
    assert_eq!(a.fact_id, b.fact_id);
    assert_eq!(a.fact_id.as_str().len(), 64);
  }

  #[test]
  fn any_field_change_changes_the_id() {
    let base = missed().into_fact().unwrap();

    let mut other = missed();
    other.recorded_by = "dr.ng".into();
    assert_ne!(base.fact_id, other.into_fact().unwrap().fact_id);

    let mut other = missed();
    other.payload = serde_json::json!({ "appointment_id": "physio-12", "outcome": "attended" });
    assert_ne!(base.fact_id, other.into_fact().unwrap().fact_id);
  }

  #[test]
  fn unknown_fact_type_is_rejected() {
    let mut m = missed();
    m.fact_type = "try_scored".into();
    assert!(matches!(m.into_fact(), Err(Error::UnknownFactType(t)) if t == "try_scored"));
  }

  #[test]
  fn malformed_payload_is_rejected() {
    let mut m = missed();
    m.payload = serde_json::json!({ "outcome": "maybe" });
    assert!(matches!(m.into_fact(), Err(Error::Serialization(_))));
  }

  #[test]
  fn mutation_reads_camel_case_wire_form() {
    let raw = r#"{
      "factType": "injury_event",
      "playerId": "p-11",
      "payload": { "severity": "moderate", "status": "active" },
      "occurredAt": "2024-05-02T18:00:00Z",
      "recordedBy": "physio"
    }"#;
    let m: FactMutation = serde_json::from_str(raw).unwrap();
    let fact = m.into_fact().unwrap();
    assert_eq!(fact.fact_type(), FactType::InjuryEvent);
    assert_eq!(fact.player_id, "p-11");
  }
}
