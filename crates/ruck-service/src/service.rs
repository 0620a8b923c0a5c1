//! [`CascadeService`]: load, cascade, commit.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use ruck_core::{
  audit::AuditTrail,
  engine::{Cascade, CascadeEngine},
  fact::{Fact, FactMutation},
  metric::{MetricName, MetricValue},
  snapshot::{MetricSnapshot, SnapshotDiff},
  store::{CascadeCommit, CascadeStore, StoredFact, StoredSnapshot},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{PlayerLocks, Result, ServiceError};

/// A request to start tracking a player, with any metrics assessed before
/// they entered the system. Unlisted metrics start from the rule baseline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
  pub player_id: String,
  #[serde(default)]
  pub metrics:   BTreeMap<MetricName, MetricValue>,
}

pub struct CascadeService<S> {
  engine: Arc<CascadeEngine>,
  store:  Arc<S>,
  locks:  PlayerLocks,
}

impl<S> Clone for CascadeService<S> {
  fn clone(&self) -> Self {
    Self {
      engine: Arc::clone(&self.engine),
      store:  Arc::clone(&self.store),
      locks:  self.locks.clone(),
    }
  }
}

impl<S: CascadeStore> CascadeService<S> {
  pub fn new(engine: CascadeEngine, store: Arc<S>) -> Self {
    Self { engine: Arc::new(engine), store, locks: PlayerLocks::new() }
  }

  pub fn engine(&self) -> &CascadeEngine { &self.engine }

  // ─── Writes ──────────────────────────────────────────────────────────────

  /// Validate a boundary mutation and apply it.
  pub async fn submit(&self, mutation: FactMutation) -> Result<Cascade> {
    let fact = mutation
      .into_fact()
      .map_err(|e| ServiceError::BadRequest(e.to_string()))?;
    self.apply(fact).await
  }

  /// Apply one fact to its player and commit the outcome.
  ///
  /// A fact already on record changes nothing and commits nothing. A player
  /// seen for the first time is enrolled at the rule baseline in the same
  /// commit, so a rejected cascade writes nothing, not even the enrolment.
  pub async fn apply(&self, fact: Fact) -> Result<Cascade> {
    let _guard = self.locks.acquire(&fact.player_id).await;

    let loaded = self
      .store
      .load_snapshot(&fact.player_id)
      .await
      .map_err(ServiceError::store)?;
    let (current, genesis) = match loaded {
      Some(stored) => (stored, None),
      None => {
        let genesis = self
          .engine
          .baseline(fact.player_id.as_str())
          .map_err(ServiceError::Rejected)?;
        (StoredSnapshot { snapshot: genesis.clone(), version: 0 }, Some(genesis))
      }
    };

    if genesis.is_none()
      && self
        .store
        .get_fact(&fact.fact_id)
        .await
        .map_err(ServiceError::store)?
        .is_some()
    {
      debug!(fact_id = %fact.fact_id, player_id = %fact.player_id, "fact already recorded");
      return Ok(Cascade { snapshot: current.snapshot, changes: Vec::new() });
    }

    let cascade = match self.engine.apply_fact(&fact, &current.snapshot) {
      Ok(cascade) => cascade,
      Err(e) => {
        warn!(fact_id = %fact.fact_id, player_id = %fact.player_id, error = %e, "update not applied");
        return Err(ServiceError::Rejected(e));
      }
    };

    let enrolled = genesis.is_some();
    let version = self
      .store
      .commit(CascadeCommit {
        fact: fact.clone(),
        snapshot: cascade.snapshot.clone(),
        changes: cascade.changes.clone(),
        expected_version: current.version,
        genesis,
      })
      .await
      .map_err(ServiceError::store)?;

    info!(
      fact_id = %fact.fact_id,
      player_id = %fact.player_id,
      fact_type = %fact.fact_type(),
      changes = cascade.changes.len(),
      version,
      enrolled,
      "cascade committed"
    );
    Ok(cascade)
  }

  /// Start tracking a player. Seeds are checked against each metric's domain.
  /// Metrics not seeded are derived from their rules over the seeds, and a
  /// seed for a purely derived metric must agree with its rule.
  pub async fn enroll(&self, enrollment: Enrollment) -> Result<StoredSnapshot> {
    let Enrollment { player_id, metrics } = enrollment;
    if player_id.trim().is_empty() {
      return Err(ServiceError::BadRequest("player id must not be empty".into()));
    }
    for (name, value) in &metrics {
      name
        .check(*value)
        .map_err(|cause| ServiceError::BadRequest(format!("{name}: {cause}")))?;
    }

    let _guard = self.locks.acquire(&player_id).await;
    let genesis = self
      .engine
      .graph()
      .seeded(player_id.as_str(), metrics)
      .map_err(|e| match e {
        ruck_core::Error::SeedMismatch { .. } => ServiceError::BadRequest(e.to_string()),
        e => ServiceError::Rejected(e),
      })?;

    let stored = self.store.enroll(&genesis).await.map_err(ServiceError::store)?;
    info!(%player_id, "player enrolled");
    Ok(stored)
  }

  // ─── Reads ───────────────────────────────────────────────────────────────

  /// The player's snapshot now, or as it stood at `as_of` rebuilt from the
  /// audit trail.
  pub async fn snapshot(
    &self,
    player_id: &str,
    as_of: Option<DateTime<Utc>>,
  ) -> Result<MetricSnapshot> {
    match as_of {
      None => Ok(
        self
          .store
          .load_snapshot(player_id)
          .await
          .map_err(ServiceError::store)?
          .ok_or_else(|| not_found(player_id))?
          .snapshot,
      ),
      Some(at) => Ok(self.audit(player_id).await?.reconstruct_snapshot(at)),
    }
  }

  pub async fn audit(&self, player_id: &str) -> Result<AuditTrail> {
    self
      .store
      .load_audit_trail(player_id)
      .await
      .map_err(ServiceError::store)?
      .ok_or_else(|| not_found(player_id))
  }

  pub async fn facts(&self, player_id: &str) -> Result<Vec<StoredFact>> {
    self.store.list_facts(player_id).await.map_err(ServiceError::store)
  }

  pub async fn players(&self) -> Result<Vec<String>> {
    self.store.list_players().await.map_err(ServiceError::store)
  }

  /// Replay the whole audit trail and compare it with the stored snapshot.
  /// An empty diff means the trail fully explains the current values.
  pub async fn verify(&self, player_id: &str) -> Result<SnapshotDiff> {
    let _guard = self.locks.acquire(player_id).await;
    let trail = self.audit(player_id).await?;
    let current = self.snapshot(player_id, None).await?;
    let diff = trail.reconstruct_snapshot(DateTime::<Utc>::MAX_UTC).diff(&current);
    if !diff.is_empty() {
      warn!(%player_id, drift = diff.deltas.len(), "audit trail does not reproduce snapshot");
    }
    Ok(diff)
  }
}

fn not_found(player_id: &str) -> ServiceError {
  ServiceError::NotFound(format!("player {player_id:?} is not enrolled"))
}
