//! Per-subject engaged time, reduced from a group's sessions.
//!
//! The reduction unions the outer bounds of a subject's sessions: the earliest
//! start to the latest end. Gaps between sessions are therefore counted as
//! attended time. This approximation is intentional and must not be swapped
//! for interval summing without agreeing on the new semantics.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::AttendanceSession;

/// Derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationSummary {
  pub subject_id:     Uuid,
  pub earliest_start: DateTime<Utc>,
  pub latest_end:     DateTime<Utc>,
  pub duration_ms:    i64,
}

/// Reduce `sessions` (all from one group) into one summary per subject,
/// ordered by subject id.
///
/// Open sessions contribute up to their `last_seen_at`; callers that know a
/// fresher sighting should overlay it before calling.
pub fn summarize_sessions<'a, I>(sessions: I) -> Vec<DurationSummary>
where
  I: IntoIterator<Item = &'a AttendanceSession>,
{
  let mut bounds: BTreeMap<Uuid, (DateTime<Utc>, DateTime<Utc>)> = BTreeMap::new();

  for s in sessions {
    let end = s.effective_end();
    bounds
      .entry(s.subject_id)
      .and_modify(|(lo, hi)| {
        *lo = (*lo).min(s.start_time);
        *hi = (*hi).max(end);
      })
      .or_insert((s.start_time, end));
  }

  bounds
    .into_iter()
    .map(|(subject_id, (earliest_start, latest_end))| DurationSummary {
      subject_id,
      earliest_start,
      latest_end,
      duration_ms: (latest_end - earliest_start).num_milliseconds().max(0),
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn at(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).unwrap() }

  fn session(subject_id: Uuid, start: i64, last_seen: i64, end: Option<i64>) -> AttendanceSession {
    AttendanceSession {
      session_id: Uuid::new_v4(),
      group_id: Uuid::nil(),
      subject_id,
      start_time: at(start),
      last_seen_at: at(last_seen),
      end_time: end.map(at),
      scanner_id: "x".into(),
    }
  }

  #[test]
  fn empty_group_has_no_summaries() {
    assert!(summarize_sessions(&Vec::<AttendanceSession>::new()).is_empty());
  }

  #[test]
  fn open_session_counts_up_to_last_seen() {
    let s1 = Uuid::new_v4();
    let out = summarize_sessions(&[session(s1, 100, 400, None)]);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].duration_ms, 300_000);
    assert_eq!(out[0].latest_end, at(400));
  }

  #[test]
  fn sessions_union_outer_bounds_including_gaps() {
    let s1 = Uuid::new_v4();
    let sessions = [
      session(s1, 0, 60, Some(60)),
      // one hour gap
      session(s1, 3660, 3720, Some(3720)),
    ];
    let out = summarize_sessions(&sessions);
    assert_eq!(out[0].earliest_start, at(0));
    assert_eq!(out[0].latest_end, at(3720));
    assert_eq!(out[0].duration_ms, 3_720_000);
  }

  #[test]
  fn subjects_are_separated_and_ordered() {
    let a = Uuid::from_u128(1);
    let b = Uuid::from_u128(2);
    let sessions = [session(b, 0, 10, Some(10)), session(a, 5, 7, None)];
    let out = summarize_sessions(&sessions);
    assert_eq!(out.iter().map(|d| d.subject_id).collect::<Vec<_>>(), vec![a, b]);
    assert_eq!(out[0].duration_ms, 2_000);
    assert_eq!(out[1].duration_ms, 10_000);
  }

  #[test]
  fn duration_is_never_negative() {
    let s1 = Uuid::new_v4();
    // A corrupt row with end before start must still clamp to zero.
    let out = summarize_sessions(&[session(s1, 100, 50, Some(50))]);
    assert_eq!(out[0].duration_ms, 0);
  }
}
