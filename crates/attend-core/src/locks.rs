//! Per-slot serialization for the reconciler.

use std::hash::{DefaultHasher, Hash, Hasher};

use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const SHARDS: usize = 64;

/// A fixed set of async mutexes; a (group, subject) slot always hashes to the
/// same shard. Unrelated slots may share a shard, which only costs waiting.
pub(crate) struct SlotLocks {
  shards: Vec<Mutex<()>>,
}

impl SlotLocks {
  pub(crate) fn new() -> Self {
    Self { shards: (0..SHARDS).map(|_| Mutex::new(())).collect() }
  }

  pub(crate) async fn lock(&self, group_id: Uuid, subject_id: Uuid) -> MutexGuard<'_, ()> {
    let mut hasher = DefaultHasher::new();
    (group_id, subject_id).hash(&mut hasher);
    let idx = (hasher.finish() % SHARDS as u64) as usize;
    self.shards[idx].lock().await
  }
}
