//! Error types for `attend-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("group not found: {0}")]
  GroupNotFound(Uuid),

  #[error("subject not found: {0}")]
  SubjectNotFound(Uuid),

  #[error("session not found: {0}")]
  SessionNotFound(Uuid),

  #[error("beacon not found: {0}")]
  BeaconNotFound(Uuid),

  /// The beacon is paired to somebody else and may not be taken over.
  #[error("beacon {key} is already paired to subject {owner_id}")]
  BeaconConflict { key: String, owner_id: Uuid },

  #[error("subject {subject_id} does not own beacon {beacon_id}")]
  NotBeaconOwner { beacon_id: Uuid, subject_id: Uuid },

  #[error("forbidden: {0}")]
  Forbidden(String),

  /// A conditional create or update lost to a concurrent writer. Retrying the
  /// whole operation is safe.
  #[error("lost a race with a concurrent update; retry")]
  RaceLost,

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap a backend error.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
