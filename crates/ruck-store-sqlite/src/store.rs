//! [`SqliteStore`], the SQLite implementation of [`CascadeStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use tracing::debug;

use ruck_core::{
  audit::AuditTrail,
  fact::FactId,
  snapshot::MetricSnapshot,
  store::{CascadeCommit, CascadeStore, StoredFact, StoredSnapshot},
};

use crate::{
  Error, Result,
  encode::{
    ChangeRow, FactRow, RawChange, RawFact, RawSnapshot, decode_snapshot,
    decode_version, encode_dt, encode_snapshot, encode_version,
  },
  schema::SCHEMA,
};

/// What the commit transaction saw; errors are built outside the closure.
enum CommitOutcome {
  Committed(i64),
  AlreadyEnrolled,
  UnknownPlayer,
  Conflict(i64),
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Ruck metric store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── CascadeStore impl ───────────────────────────────────────────────────────

impl CascadeStore for SqliteStore {
  type Error = Error;

  // ── Snapshots ─────────────────────────────────────────────────────────────

  async fn enroll(&self, genesis: &MetricSnapshot) -> Result<StoredSnapshot> {
    let player_id = genesis.player_id().to_owned();
    let json = encode_snapshot(genesis)?;
    let now = encode_dt(Utc::now());

    let id = player_id.clone();
    let inserted = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "INSERT OR IGNORE INTO snapshots
             (player_id, snapshot_json, genesis_json, version, enrolled_at, updated_at)
           VALUES (?1, ?2, ?2, 0, ?3, ?3)",
          rusqlite::params![id, json, now],
        )?;
        Ok(n == 1)
      })
      .await?;

    if !inserted {
      return Err(Error::AlreadyEnrolled(player_id));
    }
    debug!(%player_id, "player enrolled");
    Ok(StoredSnapshot { snapshot: genesis.clone(), version: 0 })
  }

  async fn load_snapshot(&self, player_id: &str) -> Result<Option<StoredSnapshot>> {
    let id = player_id.to_owned();

    let raw: Option<RawSnapshot> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT snapshot_json, version FROM snapshots WHERE player_id = ?1",
            rusqlite::params![id],
            |row| {
              Ok(RawSnapshot {
                snapshot_json: row.get(0)?,
                version:       row.get(1)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawSnapshot::into_stored).transpose()
  }

  // ── Commit ────────────────────────────────────────────────────────────────

  async fn commit(&self, commit: CascadeCommit) -> Result<u64> {
    let player_id = commit.snapshot.player_id().to_owned();
    if commit.fact.player_id != player_id {
      return Err(
        ruck_core::Error::PlayerMismatch {
          expected: player_id,
          found:    commit.fact.player_id,
        }
        .into(),
      );
    }
    if let Some(stray) = commit.changes.iter().find(|c| c.player_id != player_id) {
      return Err(
        ruck_core::Error::PlayerMismatch {
          expected: player_id,
          found:    stray.player_id.clone(),
        }
        .into(),
      );
    }
    if let Some(genesis) = &commit.genesis
      && genesis.player_id() != player_id
    {
      return Err(
        ruck_core::Error::PlayerMismatch {
          expected: player_id,
          found:    genesis.player_id().to_owned(),
        }
        .into(),
      );
    }

    let fact = FactRow::encode(&commit.fact)?;
    let snapshot_json = encode_snapshot(&commit.snapshot)?;
    let changes = commit
      .changes
      .iter()
      .map(ChangeRow::encode)
      .collect::<Result<Vec<_>>>()?;
    let genesis_json = commit.genesis.as_ref().map(encode_snapshot).transpose()?;
    let expected = encode_version(commit.expected_version)?;
    let now = encode_dt(Utc::now());

    let id = player_id.clone();
    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        if let Some(genesis_json) = &genesis_json {
          let n = tx.execute(
            "INSERT OR IGNORE INTO snapshots
               (player_id, snapshot_json, genesis_json, version, enrolled_at, updated_at)
             VALUES (?1, ?2, ?2, 0, ?3, ?3)",
            rusqlite::params![id, genesis_json, now],
          )?;
          if n == 0 {
            return Ok(CommitOutcome::AlreadyEnrolled);
          }
        }

        let found: Option<i64> = tx
          .query_row(
            "SELECT version FROM snapshots WHERE player_id = ?1",
            rusqlite::params![id],
            |r| r.get(0),
          )
          .optional()?;
        let Some(found) = found else {
          return Ok(CommitOutcome::UnknownPlayer);
        };
        if found != expected {
          return Ok(CommitOutcome::Conflict(found));
        }

        tx.execute(
          "INSERT OR IGNORE INTO facts (
             fact_id, player_id, fact_type, payload_json,
             occurred_at, recorded_by, recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            fact.fact_id,
            fact.player_id,
            fact.fact_type,
            fact.payload_json,
            fact.occurred_at,
            fact.recorded_by,
            now,
          ],
        )?;

        tx.execute(
          "UPDATE snapshots
           SET snapshot_json = ?1, version = version + 1, updated_at = ?2
           WHERE player_id = ?3 AND version = ?4",
          rusqlite::params![snapshot_json, now, id, expected],
        )?;

        {
          let mut stmt = tx.prepare(
            "INSERT INTO change_records (
               player_id, fact_id, metric, before_json, after_json,
               via_json, actor, recorded_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          )?;
          for c in &changes {
            stmt.execute(rusqlite::params![
              c.player_id,
              c.fact_id,
              c.metric,
              c.before_json,
              c.after_json,
              c.via_json,
              c.actor,
              c.recorded_at,
            ])?;
          }
        }

        tx.commit()?;
        Ok(CommitOutcome::Committed(found + 1))
      })
      .await?;

    match outcome {
      CommitOutcome::Committed(version) => {
        debug!(%player_id, version, changes = commit.changes.len(), "cascade committed");
        decode_version(version)
      }
      CommitOutcome::AlreadyEnrolled => Err(Error::AlreadyEnrolled(player_id)),
      CommitOutcome::UnknownPlayer => Err(Error::UnknownPlayer(player_id)),
      CommitOutcome::Conflict(found) => Err(Error::Conflict {
        player_id,
        expected: commit.expected_version,
        found:    decode_version(found)?,
      }),
    }
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn load_audit_trail(&self, player_id: &str) -> Result<Option<AuditTrail>> {
    let id = player_id.to_owned();

    let raw: Option<(String, Vec<RawChange>)> = self
      .conn
      .call(move |conn| {
        let genesis: Option<String> = conn
          .query_row(
            "SELECT genesis_json FROM snapshots WHERE player_id = ?1",
            rusqlite::params![id],
            |r| r.get(0),
          )
          .optional()?;
        let Some(genesis) = genesis else { return Ok(None) };

        let mut stmt = conn.prepare(
          "SELECT player_id, fact_id, metric, before_json, after_json,
                  via_json, actor, recorded_at
           FROM change_records
           WHERE player_id = ?1
           ORDER BY seq",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id], |row| {
            Ok(RawChange {
              player_id:   row.get(0)?,
              fact_id:     row.get(1)?,
              metric:      row.get(2)?,
              before_json: row.get(3)?,
              after_json:  row.get(4)?,
              via_json:    row.get(5)?,
              actor:       row.get(6)?,
              recorded_at: row.get(7)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some((genesis, rows)))
      })
      .await?;

    let Some((genesis, rows)) = raw else { return Ok(None) };
    let records = rows
      .into_iter()
      .map(RawChange::into_record)
      .collect::<Result<Vec<_>>>()?;

    let mut trail = AuditTrail::new(decode_snapshot(&genesis)?);
    trail.append(records)?;
    Ok(Some(trail))
  }

  async fn get_fact(&self, fact_id: &FactId) -> Result<Option<StoredFact>> {
    let id = fact_id.as_str().to_owned();

    let raw: Option<RawFact> = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {} FROM facts WHERE fact_id = ?1", RawFact::COLUMNS);
        Ok(conn
          .query_row(&sql, rusqlite::params![id], RawFact::from_row)
          .optional()?)
      })
      .await?;

    raw.map(RawFact::into_stored).transpose()
  }

  async fn list_facts(&self, player_id: &str) -> Result<Vec<StoredFact>> {
    let id = player_id.to_owned();

    let raws: Vec<RawFact> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM facts WHERE player_id = ?1 ORDER BY rowid",
          RawFact::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![id], RawFact::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFact::into_stored).collect()
  }

  async fn list_players(&self) -> Result<Vec<String>> {
    let ids: Vec<String> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT player_id FROM snapshots ORDER BY player_id")?;
        let rows = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(ids)
  }
}
