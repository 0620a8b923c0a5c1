//! `ruck`: apply player facts and inspect the resulting metrics.
//!
//! Reads `ruck.toml` (or the path given with `--config`), opens the SQLite
//! store, and runs one subcommand. Results are printed to stdout as JSON;
//! logs go to stderr.
//!
//! # Usage
//!
//! ```text
//! ruck enroll player.json
//! ruck apply missed-appointment.json
//! ruck snapshot p-14 --as-of 2024-05-06T12:00:00Z
//! ruck audit p-14
//! ```

mod config;

use std::{
  io::{self, Read as _},
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{Context as _, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use ruck_core::{engine::CascadeEngine, fact::FactMutation, rules::standard_graph};
use ruck_service::{CascadeService, Enrollment};
use ruck_store_sqlite::SqliteStore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, expand_tilde};

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "ruck", version, about = "Player-metric cascade engine")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "ruck.toml")]
  config: PathBuf,

  /// Override the configured SQLite database path.
  #[arg(long, value_name = "FILE")]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Apply one fact mutation, or a JSON array of them, and print the
  /// cascade report for each.
  Apply {
    /// JSON file to read, or `-` for stdin.
    input: String,
  },
  /// Start tracking a player, optionally with seeded metric values.
  Enroll {
    /// JSON file to read, or `-` for stdin.
    input: String,
  },
  /// Print a player's metric values.
  Snapshot {
    player: String,
    /// Rebuild the snapshot as it stood at this RFC 3339 instant.
    #[arg(long)]
    as_of:  Option<DateTime<Utc>>,
    /// Include provenance (computed_at, contributing facts) per metric.
    #[arg(long)]
    full:   bool,
  },
  /// Print a player's change records, oldest first.
  Audit { player: String },
  /// Replay the audit trail and report any drift from the stored snapshot.
  Verify { player: String },
  /// Print the facts recorded for a player.
  Facts { player: String },
  /// List enrolled players.
  Players,
  /// Print the rule graph in evaluation order.
  Rules,
}

/// `apply` accepts a single mutation or a batch.
#[derive(Deserialize)]
#[serde(untagged)]
enum Mutations {
  One(FactMutation),
  Many(Vec<FactMutation>),
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_writer(io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let mut cfg = AppConfig::load(&cli.config)?;
  if let Some(path) = &cli.store {
    cfg.store_path = expand_tilde(path);
  }

  let graph = standard_graph(&cfg.scoring).context("failed to build rule graph")?;
  let engine = CascadeEngine::new(graph).context("rule graph is incomplete")?;

  if let Command::Rules = cli.command {
    let rules: Vec<_> = engine
      .graph()
      .topological_order()
      .iter()
      .filter_map(|m| engine.graph().rule(*m))
      .map(|r| {
        json!({
          "metric":    r.target,
          "dependsOn": r.depends_on.iter().map(ToString::to_string).collect::<Vec<_>>(),
        })
      })
      .collect();
    return print_json(&rules);
  }

  let store = open_store(&cfg.store_path).await?;
  let service = CascadeService::new(engine, Arc::new(store));

  match cli.command {
    Command::Apply { input } => {
      let mutations: Mutations = read_json(&input)?;
      let mutations = match mutations {
        Mutations::One(m) => vec![m],
        Mutations::Many(ms) => ms,
      };
      let mut reports = Vec::with_capacity(mutations.len());
      for (i, m) in mutations.into_iter().enumerate() {
        let cascade = service
          .submit(m)
          .await
          .with_context(|| format!("mutation #{i} was not applied"))?;
        reports.push(cascade.report());
      }
      if let [report] = reports.as_slice() {
        print_json(report)
      } else {
        print_json(&reports)
      }
    }
    Command::Enroll { input } => {
      let enrollment: Enrollment = read_json(&input)?;
      let stored = service.enroll(enrollment).await?;
      print_json(&stored.snapshot.values())
    }
    Command::Snapshot { player, as_of, full } => {
      let snapshot = service.snapshot(&player, as_of).await?;
      if full {
        print_json(&snapshot)
      } else {
        print_json(&snapshot.values())
      }
    }
    Command::Audit { player } => {
      let trail = service.audit(&player).await?;
      print_json(&trail.records())
    }
    Command::Verify { player } => {
      let diff = service.verify(&player).await?;
      print_json(&diff)?;
      if !diff.is_empty() {
        bail!("audit trail for {player:?} does not reproduce its snapshot");
      }
      Ok(())
    }
    Command::Facts { player } => print_json(&service.facts(&player).await?),
    Command::Players => print_json(&service.players().await?),
    Command::Rules => Ok(()),
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

async fn open_store(path: &Path) -> anyhow::Result<SqliteStore> {
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {}", parent.display()))?;
  }
  SqliteStore::open(path)
    .await
    .with_context(|| format!("failed to open store at {path:?}"))
}

fn read_json<T: for<'de> Deserialize<'de>>(input: &str) -> anyhow::Result<T> {
  let raw = if input == "-" {
    let mut buf = String::new();
    io::stdin()
      .read_to_string(&mut buf)
      .context("failed to read stdin")?;
    buf
  } else {
    std::fs::read_to_string(input).with_context(|| format!("failed to read {input}"))?
  };
  serde_json::from_str(&raw).with_context(|| format!("failed to parse {input}"))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
  let out = serde_json::to_string_pretty(value).context("failed to serialise output")?;
  println!("{out}");
  Ok(())
}
