//! SQL schema for the Ruck SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per enrolled player. The only table that is ever updated, and
-- only through a version-checked commit.
CREATE TABLE IF NOT EXISTS snapshots (
    player_id     TEXT PRIMARY KEY,
    snapshot_json TEXT NOT NULL,
    genesis_json  TEXT NOT NULL,   -- snapshot at enrolment; audit replay base
    version       INTEGER NOT NULL DEFAULT 0,
    enrolled_at   TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

-- Facts are strictly append-only. The id is a content hash, so a
-- resubmitted observation collides and is ignored.
CREATE TABLE IF NOT EXISTS facts (
    fact_id      TEXT PRIMARY KEY,
    player_id    TEXT NOT NULL REFERENCES snapshots(player_id),
    fact_type    TEXT NOT NULL,   -- discriminant of FactPayload variant
    payload_json TEXT NOT NULL,   -- JSON payload (inner data only)
    occurred_at  TEXT NOT NULL,
    recorded_by  TEXT NOT NULL,
    recorded_at  TEXT NOT NULL    -- ISO 8601 UTC; server-assigned
);

-- One row per metric change, in cascade order.
CREATE TABLE IF NOT EXISTS change_records (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    player_id   TEXT NOT NULL REFERENCES snapshots(player_id),
    fact_id     TEXT NOT NULL REFERENCES facts(fact_id),
    metric      TEXT NOT NULL,
    before_json TEXT NOT NULL,
    after_json  TEXT NOT NULL,
    via_json    TEXT NOT NULL DEFAULT '[]',
    actor       TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS facts_player_idx   ON facts(player_id);
CREATE INDEX IF NOT EXISTS changes_player_idx ON change_records(player_id);
CREATE INDEX IF NOT EXISTS changes_fact_idx   ON change_records(fact_id);

PRAGMA user_version = 1;
";
