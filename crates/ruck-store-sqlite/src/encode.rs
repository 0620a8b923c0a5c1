//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Snapshots, payloads and
//! metric values are stored as compact JSON.

use chrono::{DateTime, Utc};
use ruck_core::{
  audit::ChangeRecord,
  fact::{Fact, FactId, FactPayload, FactType},
  metric::{MetricName, MetricValue},
  snapshot::MetricSnapshot,
  store::{StoredFact, StoredSnapshot},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Version ─────────────────────────────────────────────────────────────────

pub fn encode_version(v: u64) -> Result<i64> {
  i64::try_from(v).map_err(|_| Error::Decode(format!("version {v} out of range")))
}

pub fn decode_version(v: i64) -> Result<u64> {
  u64::try_from(v).map_err(|_| Error::Decode(format!("negative version {v}")))
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

pub fn encode_snapshot(s: &MetricSnapshot) -> Result<String> {
  Ok(serde_json::to_string(s)?)
}

pub fn decode_snapshot(s: &str) -> Result<MetricSnapshot> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw columns of a `snapshots` row.
pub struct RawSnapshot {
  pub snapshot_json: String,
  pub version:       i64,
}

impl RawSnapshot {
  pub fn into_stored(self) -> Result<StoredSnapshot> {
    Ok(StoredSnapshot {
      snapshot: decode_snapshot(&self.snapshot_json)?,
      version:  decode_version(self.version)?,
    })
  }
}

/// Column values for one `facts` row, in insert order.
pub struct FactRow {
  pub fact_id:      String,
  pub player_id:    String,
  pub fact_type:    &'static str,
  pub payload_json: String,
  pub occurred_at:  String,
  pub recorded_by:  String,
}

impl FactRow {
  pub fn encode(fact: &Fact) -> Result<Self> {
    Ok(Self {
      fact_id:      fact.fact_id.as_str().to_owned(),
      player_id:    fact.player_id.clone(),
      fact_type:    fact.fact_type().as_str(),
      payload_json: fact.payload.to_json()?.to_string(),
      occurred_at:  encode_dt(fact.occurred_at),
      recorded_by:  fact.recorded_by.clone(),
    })
  }
}

/// Raw strings read directly from a `facts` row.
pub struct RawFact {
  pub fact_id:      String,
  pub player_id:    String,
  pub fact_type:    String,
  pub payload_json: String,
  pub occurred_at:  String,
  pub recorded_by:  String,
  pub recorded_at:  String,
}

impl RawFact {
  pub const COLUMNS: &'static str =
    "fact_id, player_id, fact_type, payload_json, occurred_at, recorded_by, recorded_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      fact_id:      row.get(0)?,
      player_id:    row.get(1)?,
      fact_type:    row.get(2)?,
      payload_json: row.get(3)?,
      occurred_at:  row.get(4)?,
      recorded_by:  row.get(5)?,
      recorded_at:  row.get(6)?,
    })
  }

  pub fn into_stored(self) -> Result<StoredFact> {
    let fact_type = FactType::parse(&self.fact_type)?;
    let data: serde_json::Value = serde_json::from_str(&self.payload_json)?;
    let fact = Fact {
      fact_id:     FactId::new(self.fact_id),
      player_id:   self.player_id,
      payload:     FactPayload::from_parts(fact_type, data)?,
      occurred_at: decode_dt(&self.occurred_at)?,
      recorded_by: self.recorded_by,
    };
    Ok(StoredFact { fact, recorded_at: decode_dt(&self.recorded_at)? })
  }
}

/// Column values for one `change_records` row, in insert order.
pub struct ChangeRow {
  pub player_id:   String,
  pub fact_id:     String,
  pub metric:      &'static str,
  pub before_json: String,
  pub after_json:  String,
  pub via_json:    String,
  pub actor:       String,
  pub recorded_at: String,
}

impl ChangeRow {
  pub fn encode(r: &ChangeRecord) -> Result<Self> {
    Ok(Self {
      player_id:   r.player_id.clone(),
      fact_id:     r.triggered_by.as_str().to_owned(),
      metric:      r.metric.as_str(),
      before_json: serde_json::to_string(&r.before)?,
      after_json:  serde_json::to_string(&r.after)?,
      via_json:    serde_json::to_string(&r.via)?,
      actor:       r.actor.clone(),
      recorded_at: encode_dt(r.timestamp),
    })
  }
}

/// Raw strings read directly from a `change_records` row.
pub struct RawChange {
  pub player_id:   String,
  pub fact_id:     String,
  pub metric:      String,
  pub before_json: String,
  pub after_json:  String,
  pub via_json:    String,
  pub actor:       String,
  pub recorded_at: String,
}

impl RawChange {
  pub fn into_record(self) -> Result<ChangeRecord> {
    let before: MetricValue = serde_json::from_str(&self.before_json)?;
    let after: MetricValue = serde_json::from_str(&self.after_json)?;
    let via: Vec<MetricName> = serde_json::from_str(&self.via_json)?;
    Ok(ChangeRecord {
      metric: MetricName::parse(&self.metric)?,
      player_id: self.player_id,
      before,
      after,
      triggered_by: FactId::new(self.fact_id),
      via,
      actor: self.actor,
      timestamp: decode_dt(&self.recorded_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn versions_reject_out_of_range() {
    assert_eq!(decode_version(3).unwrap(), 3);
    assert!(matches!(decode_version(-1), Err(Error::Decode(_))));
    assert!(matches!(encode_version(u64::MAX), Err(Error::Decode(_))));
  }

  #[test]
  fn unknown_metric_column_is_an_error() {
    let raw = RawChange {
      player_id:   "p".into(),
      fact_id:     "f".into(),
      metric:      "Morale".into(),
      before_json: "1.0".into(),
      after_json:  "2.0".into(),
      via_json:    "[]".into(),
      actor:       "coach".into(),
      recorded_at: "2024-05-06T10:00:00+00:00".into(),
    };
    assert!(matches!(
      raw.into_record(),
      Err(Error::Core(ruck_core::Error::UnknownMetric(_)))
    ));
  }
}
