//! Subjects, groups and the acting caller.
//!
//! Identity and scheduling live outside this crate. We keep only what the
//! tracker needs: a display name for ranking, and a registered group id so
//! sightings for unknown groups can be rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An entity tracked for presence (a team member).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
  pub subject_id:   Uuid,
  pub display_name: String,
  pub created_at:   DateTime<Utc>,
}

/// The container of a set of sessions, e.g. one meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
  pub group_id:   Uuid,
  pub name:       String,
  pub created_at: DateTime<Utc>,
}

/// The authenticated subject on whose behalf an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
  pub subject_id: Uuid,
  /// Holds the role required for administrative beacon operations.
  pub elevated:   bool,
}

impl Actor {
  pub fn member(subject_id: Uuid) -> Self { Self { subject_id, elevated: false } }

  pub fn elevated(subject_id: Uuid) -> Self { Self { subject_id, elevated: true } }
}
