//! The points ledger that feeds the points leaderboard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One award (or deduction, when `amount` is negative).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsEntry {
  pub entry_id:   Uuid,
  pub subject_id: Uuid,
  pub amount:     i64,
  pub reason:     Option<String>,
  pub awarded_at: DateTime<Utc>,
}

/// Input to [`crate::store::AttendanceStore::record_points`].
#[derive(Debug, Clone)]
pub struct NewPoints {
  pub subject_id: Uuid,
  pub amount:     i64,
  pub reason:     Option<String>,
  pub awarded_at: DateTime<Utc>,
}

/// A subject's ledger balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsTotal {
  pub subject_id:      Uuid,
  pub total:           i64,
  pub last_awarded_at: DateTime<Utc>,
}
