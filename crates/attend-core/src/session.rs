//! Attendance sessions and the per-slot state machine.
//!
//! Each (group, subject) slot moves `NoSession → Open → Closed`. Refresh
//! sightings loop on `Open`. `Closed` is terminal for that session; a later
//! sighting opens a fresh one, so closed sessions are immutable history.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bounded stretch of presence for one subject in one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceSession {
  pub session_id:   Uuid,
  pub group_id:     Uuid,
  pub subject_id:   Uuid,
  pub start_time:   DateTime<Utc>,
  /// Last persisted sighting. May lag the freshest sighting by up to the
  /// throttle window.
  pub last_seen_at: DateTime<Utc>,
  /// Set once, to the session's own `last_seen_at`, when it closes.
  pub end_time:     Option<DateTime<Utc>>,
  /// The scanner that opened the session.
  pub scanner_id:   String,
}

impl AttendanceSession {
  pub fn is_open(&self) -> bool { self.end_time.is_none() }

  /// `end_time` when closed, otherwise the last persisted sighting.
  pub fn effective_end(&self) -> DateTime<Utc> {
    self.end_time.unwrap_or(self.last_seen_at)
  }
}

/// Input to [`crate::store::AttendanceStore::insert_open_session`].
#[derive(Debug, Clone)]
pub struct NewSession {
  pub group_id:    Uuid,
  pub subject_id:  Uuid,
  pub observed_at: DateTime<Utc>,
  pub scanner_id:  String,
}

// ─── Transitions ─────────────────────────────────────────────────────────────

/// What to do with a sighting for a slot that already has an open session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
  /// Write `last_seen_at = observed_at`.
  Persist,
  /// Inside the throttle window; remember the sighting but do not write.
  Throttle,
  /// Not newer than what is already persisted.
  Stale,
}

/// Decide whether a sighting at `observed_at` warrants a write, given the
/// session's persisted `last_seen_at`.
pub fn refresh_decision(
  persisted_last_seen: DateTime<Utc>,
  observed_at: DateTime<Utc>,
  throttle: TimeDelta,
) -> Refresh {
  if observed_at <= persisted_last_seen {
    Refresh::Stale
  } else if observed_at - persisted_last_seen >= throttle {
    Refresh::Persist
  } else {
    Refresh::Throttle
  }
}

/// A session is expired once the silence since `last_seen` strictly exceeds
/// `timeout`.
pub fn is_expired(last_seen: DateTime<Utc>, now: DateTime<Utc>, timeout: TimeDelta) -> bool {
  now - last_seen > timeout
}
