//! Ranked views over points and attended time.
//!
//! Ordering is total: metric descending, then the caller's tie breakers, then
//! display name (case-insensitive) and finally subject id. The same input
//! always ranks the same way.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row of a leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
  /// 1-based position; assigned by [`rank`].
  pub rank:          usize,
  pub subject_id:    Uuid,
  pub display_name:  String,
  /// Points, or attended milliseconds, depending on the board.
  pub metric:        i64,
  pub last_activity: Option<DateTime<Utc>>,
}

impl LeaderboardEntry {
  /// An unranked entry; [`rank`] fills in the position.
  pub fn new(
    subject_id: Uuid,
    display_name: impl Into<String>,
    metric: i64,
    last_activity: Option<DateTime<Utc>>,
  ) -> Self {
    Self {
      rank: 0,
      subject_id,
      display_name: display_name.into(),
      metric,
      last_activity,
    }
  }
}

/// Secondary ordering keys applied, in order, to entries with equal metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreaker {
  /// Most recent activity first; entries without activity sort last.
  RecentActivity,
  /// Display name ascending, ignoring case.
  DisplayName,
}

/// The tie breakers the tracker uses for its boards.
pub const DEFAULT_TIE_BREAKERS: &[TieBreaker] = &[TieBreaker::RecentActivity];

impl TieBreaker {
  fn compare(self, a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    match self {
      // `None < Some(_)`, so reversing puts recent first and missing last.
      Self::RecentActivity => b.last_activity.cmp(&a.last_activity),
      Self::DisplayName => compare_names(a, b),
    }
  }
}

fn compare_names(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
  a.display_name
    .to_lowercase()
    .cmp(&b.display_name.to_lowercase())
}

/// Sort `entries` into a ranked board and assign 1-based ranks.
pub fn rank(mut entries: Vec<LeaderboardEntry>, tie_breakers: &[TieBreaker]) -> Vec<LeaderboardEntry> {
  entries.sort_by(|a, b| {
    b.metric
      .cmp(&a.metric)
      .then_with(|| {
        tie_breakers
          .iter()
          .map(|tb| tb.compare(a, b))
          .find(|o| o.is_ne())
          .unwrap_or(Ordering::Equal)
      })
      .then_with(|| compare_names(a, b))
      .then_with(|| a.subject_id.cmp(&b.subject_id))
  });

  for (i, entry) in entries.iter_mut().enumerate() {
    entry.rank = i + 1;
  }
  entries
}

/// The rank-1 rows of both boards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Leaders {
  pub points:      Option<LeaderboardEntry>,
  pub hours:       Option<LeaderboardEntry>,
  /// Set when one subject tops both boards.
  pub dual_leader: Option<Uuid>,
}

/// The subject leading both boards, if there is one.
///
/// Looks only at the current rank-1 rows, so callers must pass freshly ranked
/// boards on every recomputation.
pub fn dual_leader(points: &[LeaderboardEntry], hours: &[LeaderboardEntry]) -> Option<Uuid> {
  let p = points.first()?;
  let h = hours.first()?;
  (p.subject_id == h.subject_id).then_some(p.subject_id)
}
