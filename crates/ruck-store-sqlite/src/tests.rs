//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{DateTime, TimeZone, Utc};
use ruck_core::{
  engine::CascadeEngine,
  fact::{AppointmentOutcome, AppointmentOutcomeValue, Fact, FactId, FactPayload},
  metric::{MetricName, MetricValue},
  rules::{ScoringConfig, standard_graph},
  snapshot::MetricSnapshot,
  store::{CascadeCommit, CascadeStore},
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn engine() -> CascadeEngine {
  CascadeEngine::new(standard_graph(&ScoringConfig::default()).unwrap()).unwrap()
}

fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap() }

fn missed(player_id: &str, appointment: &str) -> Fact {
  Fact::new(
    player_id,
    FactPayload::MedicalAppointmentOutcome(AppointmentOutcomeValue {
      appointment_id: Some(appointment.into()),
      outcome:        AppointmentOutcome::Missed,
    }),
    t0(),
    "dr.hale",
  )
  .unwrap()
}

fn seeded(player_id: &str) -> MetricSnapshot {
  MetricSnapshot::from_values(
    player_id,
    [
      (MetricName::AttendanceScore, MetricValue::Number(9.2)),
      (MetricName::MedicalScore, MetricValue::Number(8.8)),
      (MetricName::PlayerValue, MetricValue::Number(147_000.0)),
      (MetricName::CohesionReliability, MetricValue::Number(9.1)),
    ],
  )
}

/// Run one cascade against the stored snapshot and commit it.
async fn apply(s: &SqliteStore, fact: &Fact) -> u64 {
  let stored = s.load_snapshot(&fact.player_id).await.unwrap().unwrap();
  let cascade = engine().apply_fact_at(fact, &stored.snapshot, t0()).unwrap();
  s.commit(CascadeCommit {
    fact:             fact.clone(),
    snapshot:         cascade.snapshot,
    changes:          cascade.changes,
    expected_version: stored.version,
    genesis:          None,
  })
  .await
  .unwrap()
}

// ─── Enrolment ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn enroll_and_load_snapshot() {
  let s = store().await;
  let stored = s.enroll(&seeded("p-14")).await.unwrap();
  assert_eq!(stored.version, 0);

  let loaded = s.load_snapshot("p-14").await.unwrap().unwrap();
  assert_eq!(loaded.version, 0);
  assert_eq!(loaded.snapshot, seeded("p-14"));
}

#[tokio::test]
async fn enrolling_twice_fails() {
  let s = store().await;
  s.enroll(&MetricSnapshot::new("p-14")).await.unwrap();
  let err = s.enroll(&MetricSnapshot::new("p-14")).await.unwrap_err();
  assert!(matches!(err, Error::AlreadyEnrolled(id) if id == "p-14"));
}

#[tokio::test]
async fn missing_player_returns_none() {
  let s = store().await;
  assert!(s.load_snapshot("nobody").await.unwrap().is_none());
  assert!(s.load_audit_trail("nobody").await.unwrap().is_none());
  assert!(s.list_facts("nobody").await.unwrap().is_empty());
}

#[tokio::test]
async fn list_players_is_sorted() {
  let s = store().await;
  for id in ["p-3", "p-1", "p-2"] {
    s.enroll(&MetricSnapshot::new(id)).await.unwrap();
  }
  assert_eq!(s.list_players().await.unwrap(), vec!["p-1", "p-2", "p-3"]);
}

// ─── Commit ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn commit_persists_fact_snapshot_and_changes() {
  let s = store().await;
  s.enroll(&seeded("p-14")).await.unwrap();

  let fact = missed("p-14", "physio-3");
  assert_eq!(apply(&s, &fact).await, 1);

  let loaded = s.load_snapshot("p-14").await.unwrap().unwrap();
  assert_eq!(loaded.version, 1);
  assert_eq!(loaded.snapshot.value(MetricName::PlayerValue), MetricValue::Number(143_500.0));

  let stored = s.get_fact(&fact.fact_id).await.unwrap().unwrap();
  assert_eq!(stored.fact, fact);

  let trail = s.load_audit_trail("p-14").await.unwrap().unwrap();
  assert_eq!(trail.len(), 4);
  assert_eq!(trail.genesis(), &seeded("p-14"));
  let metrics: Vec<MetricName> = trail.records().iter().map(|r| r.metric).collect();
  assert_eq!(
    metrics,
    vec![
      MetricName::AttendanceScore,
      MetricName::MedicalScore,
      MetricName::CohesionReliability,
      MetricName::PlayerValue,
    ]
  );
  assert_eq!(trail.records()[3].via, vec![MetricName::AttendanceScore, MetricName::MedicalScore]);
  assert_eq!(trail.records()[0].triggered_by, fact.fact_id);
}

#[tokio::test]
async fn duplicate_fact_is_stored_once() {
  let s = store().await;
  s.enroll(&seeded("p-14")).await.unwrap();
  let fact = missed("p-14", "physio-3");

  apply(&s, &fact).await;
  let version = apply(&s, &fact).await;
  assert_eq!(version, 2);

  assert_eq!(s.list_facts("p-14").await.unwrap().len(), 1);
  assert_eq!(s.load_audit_trail("p-14").await.unwrap().unwrap().len(), 4);
}

#[tokio::test]
async fn list_facts_in_insertion_order() {
  let s = store().await;
  s.enroll(&MetricSnapshot::new("p-14")).await.unwrap();
  let first = missed("p-14", "a");
  let second = missed("p-14", "b");
  apply(&s, &first).await;
  apply(&s, &second).await;

  let ids: Vec<FactId> = s
    .list_facts("p-14")
    .await
    .unwrap()
    .into_iter()
    .map(|f| f.fact.fact_id)
    .collect();
  assert_eq!(ids, vec![first.fact_id, second.fact_id]);
}

#[tokio::test]
async fn stale_version_is_a_conflict_and_writes_nothing() {
  let s = store().await;
  s.enroll(&seeded("p-14")).await.unwrap();
  apply(&s, &missed("p-14", "physio-3")).await;

  let fact = missed("p-14", "physio-4");
  let cascade = engine()
    .apply_fact_at(&fact, &seeded("p-14"), t0())
    .unwrap();
  let err = s
    .commit(CascadeCommit {
      fact:             fact.clone(),
      snapshot:         cascade.snapshot,
      changes:          cascade.changes,
      expected_version: 0,
      genesis:          None,
    })
    .await
    .unwrap_err();

  assert!(matches!(err, Error::Conflict { expected: 0, found: 1, .. }));
  assert!(s.get_fact(&fact.fact_id).await.unwrap().is_none());
  assert_eq!(s.load_audit_trail("p-14").await.unwrap().unwrap().len(), 4);
  assert_eq!(s.load_snapshot("p-14").await.unwrap().unwrap().version, 1);
}

#[tokio::test]
async fn commit_for_unknown_player_fails() {
  let s = store().await;
  let fact = missed("ghost", "a");
  let err = s
    .commit(CascadeCommit {
      fact,
      snapshot: MetricSnapshot::new("ghost"),
      changes: Vec::new(),
      expected_version: 0,
      genesis: None,
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::UnknownPlayer(id) if id == "ghost"));
}

#[tokio::test]
async fn commit_rejects_mixed_players() {
  let s = store().await;
  s.enroll(&MetricSnapshot::new("p-1")).await.unwrap();
  let err = s
    .commit(CascadeCommit {
      fact:             missed("p-2", "a"),
      snapshot:         MetricSnapshot::new("p-1"),
      changes:          Vec::new(),
      expected_version: 0,
      genesis:          None,
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(ruck_core::Error::PlayerMismatch { .. })));
}

#[tokio::test]
async fn commit_can_enroll_in_the_same_transaction() {
  let s = store().await;
  let genesis = engine().baseline("p-new").unwrap();
  let fact = missed("p-new", "a");
  let cascade = engine().apply_fact_at(&fact, &genesis, t0()).unwrap();

  let version = s
    .commit(CascadeCommit {
      fact:             fact.clone(),
      snapshot:         cascade.snapshot.clone(),
      changes:          cascade.changes,
      expected_version: 0,
      genesis:          Some(genesis.clone()),
    })
    .await
    .unwrap();

  assert_eq!(version, 1);
  assert_eq!(s.load_snapshot("p-new").await.unwrap().unwrap().snapshot, cascade.snapshot);
  assert_eq!(s.load_audit_trail("p-new").await.unwrap().unwrap().genesis(), &genesis);
}

#[tokio::test]
async fn enrolling_commit_for_existing_player_writes_nothing() {
  let s = store().await;
  s.enroll(&seeded("p-14")).await.unwrap();
  let fact = missed("p-14", "a");
  let cascade = engine()
    .apply_fact_at(&fact, &MetricSnapshot::new("p-14"), t0())
    .unwrap();

  let err = s
    .commit(CascadeCommit {
      fact:             fact.clone(),
      snapshot:         cascade.snapshot,
      changes:          cascade.changes,
      expected_version: 0,
      genesis:          Some(MetricSnapshot::new("p-14")),
    })
    .await
    .unwrap_err();

  assert!(matches!(err, Error::AlreadyEnrolled(id) if id == "p-14"));
  assert!(s.get_fact(&fact.fact_id).await.unwrap().is_none());
  assert_eq!(s.load_snapshot("p-14").await.unwrap().unwrap().snapshot, seeded("p-14"));
}

// ─── Audit replay ────────────────────────────────────────────────────────────

#[tokio::test]
async fn stored_trail_replays_to_stored_snapshot() {
  let s = store().await;
  s.enroll(&seeded("p-14")).await.unwrap();
  apply(&s, &missed("p-14", "a")).await;
  apply(&s, &missed("p-14", "b")).await;

  let trail = s.load_audit_trail("p-14").await.unwrap().unwrap();
  let current = s.load_snapshot("p-14").await.unwrap().unwrap().snapshot;
  assert!(trail.reconstruct_snapshot(Utc::now()).diff(&current).is_empty());
}

#[tokio::test]
async fn store_survives_reopen() {
  let dir = std::env::temp_dir().join(format!("ruck-store-{}", std::process::id()));
  std::fs::create_dir_all(&dir).unwrap();
  let path = dir.join("reopen.db");
  let _ = std::fs::remove_file(&path);

  {
    let s = SqliteStore::open(&path).await.unwrap();
    s.enroll(&seeded("p-14")).await.unwrap();
    apply(&s, &missed("p-14", "a")).await;
  }

  let s = SqliteStore::open(&path).await.unwrap();
  let loaded = s.load_snapshot("p-14").await.unwrap().unwrap();
  assert_eq!(loaded.version, 1);
  assert_eq!(loaded.snapshot.value(MetricName::AttendanceScore), MetricValue::Number(8.7));

  let _ = std::fs::remove_dir_all(&dir);
}
