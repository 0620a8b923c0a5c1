//! Per-player write serialisation.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per player id. Cascades for the same player run one at a
/// time; different players never contend beyond the map lookup.
#[derive(Clone, Default)]
pub struct PlayerLocks {
  inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl PlayerLocks {
  pub fn new() -> Self { Self::default() }

  /// Wait for exclusive access to `player_id`. Released when the guard drops.
  ///
  /// Entries nobody holds or waits on are dropped on the way in, so the map
  /// only tracks players with work in flight.
  pub async fn acquire(&self, player_id: &str) -> OwnedMutexGuard<()> {
    let lock = {
      let mut locks = self.inner.lock().await;
      // Guards and waiters each hold a clone; a count of one is the map's own.
      locks.retain(|id, lock| id == player_id || Arc::strong_count(lock) > 1);
      Arc::clone(locks.entry(player_id.to_owned()).or_default())
    };
    lock.lock_owned().await
  }

  /// Number of players currently tracked.
  pub async fn len(&self) -> usize { self.inner.lock().await.len() }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  #[tokio::test]
  async fn same_player_waits() {
    let locks = PlayerLocks::new();
    let guard = locks.acquire("p-1").await;

    let other = locks.clone();
    let waiter = tokio::spawn(async move {
      let _g = other.acquire("p-1").await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    drop(guard);
    waiter.await.unwrap();
  }

  #[tokio::test]
  async fn different_players_do_not_block() {
    let locks = PlayerLocks::new();
    let _a = locks.acquire("p-1").await;
    let _b = tokio::time::timeout(Duration::from_secs(1), locks.acquire("p-2"))
      .await
      .expect("independent player lock");
    assert_eq!(locks.len().await, 2);
  }

  #[tokio::test]
  async fn released_players_are_pruned() {
    let locks = PlayerLocks::new();
    for i in 0..16 {
      let _g = locks.acquire(&format!("p-{i}")).await;
    }
    let _held = locks.acquire("p-held").await;
    // Only the latest caller and a held lock remain.
    let _g = locks.acquire("p-last").await;
    assert_eq!(locks.len().await, 2);
  }
}
