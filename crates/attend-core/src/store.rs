//! The `AttendanceStore` trait.
//!
//! Implemented by storage backends (e.g. `attend-store-sqlite`). The
//! [`Tracker`](crate::Tracker) drives all reconciliation through it.
//!
//! Conditional writes report their outcome instead of failing: an insert that
//! collides with an existing row returns `None`, and an update whose guard
//! no longer holds returns `false`. The tracker turns those into retries or
//! [`Error::RaceLost`](crate::Error::RaceLost).

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  beacon::{Beacon, BeaconKey, NewBeacon},
  points::{NewPoints, PointsEntry, PointsTotal},
  session::{AttendanceSession, NewSession},
  subject::{Group, Subject},
};

/// Abstraction over an attendance store backend.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait AttendanceStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Subjects & groups ─────────────────────────────────────────────────

  /// Create the subject, or rename it if it already exists.
  fn put_subject(
    &self,
    subject_id: Uuid,
    display_name: String,
  ) -> impl Future<Output = Result<Subject, Self::Error>> + Send + '_;

  fn get_subject(
    &self,
    subject_id: Uuid,
  ) -> impl Future<Output = Result<Option<Subject>, Self::Error>> + Send + '_;

  fn list_subjects(
    &self,
  ) -> impl Future<Output = Result<Vec<Subject>, Self::Error>> + Send + '_;

  /// Create the group, or rename it if it already exists.
  fn put_group(
    &self,
    group_id: Uuid,
    name: String,
  ) -> impl Future<Output = Result<Group, Self::Error>> + Send + '_;

  fn get_group(
    &self,
    group_id: Uuid,
  ) -> impl Future<Output = Result<Option<Group>, Self::Error>> + Send + '_;

  fn list_groups(&self) -> impl Future<Output = Result<Vec<Group>, Self::Error>> + Send + '_;

  /// Ids of every group that currently has at least one open session.
  fn groups_with_open_sessions(
    &self,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  // ── Beacons ───────────────────────────────────────────────────────────

  fn get_beacon(
    &self,
    beacon_id: Uuid,
  ) -> impl Future<Output = Result<Option<Beacon>, Self::Error>> + Send + '_;

  fn find_beacon_by_key(
    &self,
    key: BeaconKey,
  ) -> impl Future<Output = Result<Option<Beacon>, Self::Error>> + Send + '_;

  /// List beacons, optionally only those owned by `owner_id`.
  fn list_beacons(
    &self,
    owner_id: Option<Uuid>,
  ) -> impl Future<Output = Result<Vec<Beacon>, Self::Error>> + Send + '_;

  /// Insert a beacon unless its key is already taken, in which case `None`.
  fn insert_beacon(
    &self,
    input: NewBeacon,
  ) -> impl Future<Output = Result<Option<Beacon>, Self::Error>> + Send + '_;

  /// Set owner and label, but only while the beacon is still owned by
  /// `expected_owner`. Returns the updated record, or `None` if the guard
  /// failed or the beacon is gone.
  fn update_beacon(
    &self,
    beacon_id: Uuid,
    expected_owner: Uuid,
    owner_id: Uuid,
    label: Option<String>,
  ) -> impl Future<Output = Result<Option<Beacon>, Self::Error>> + Send + '_;

  /// Delete a beacon. Returns `false` if it did not exist.
  fn delete_beacon(
    &self,
    beacon_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Sessions ──────────────────────────────────────────────────────────

  fn get_session(
    &self,
    session_id: Uuid,
  ) -> impl Future<Output = Result<Option<AttendanceSession>, Self::Error>> + Send + '_;

  /// The open session of a (group, subject) slot, if any.
  fn find_open_session(
    &self,
    group_id: Uuid,
    subject_id: Uuid,
  ) -> impl Future<Output = Result<Option<AttendanceSession>, Self::Error>> + Send + '_;

  /// Open a session with `start_time = last_seen_at = observed_at`.
  ///
  /// Must be a single conditional insert against the at-most-one-open
  /// constraint: returns `None` if the slot already has an open session.
  fn insert_open_session(
    &self,
    input: NewSession,
  ) -> impl Future<Output = Result<Option<AttendanceSession>, Self::Error>> + Send + '_;

  /// Advance `last_seen_at` to `last_seen` (never backwards) on an open
  /// session. Returns `false` if the session is closed or missing.
  fn refresh_session(
    &self,
    session_id: Uuid,
    last_seen: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Close an open session at `last_seen`, which the caller has judged to be
  /// its final sighting: both `last_seen_at` and `end_time` are set to it.
  ///
  /// Guarded by `end_time IS NULL AND last_seen_at <= last_seen`; returns
  /// `false` if the session is already closed or was refreshed past
  /// `last_seen` by a concurrent writer.
  fn close_session(
    &self,
    session_id: Uuid,
    last_seen: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Sessions of a group, ordered by start time.
  fn list_sessions(
    &self,
    group_id: Uuid,
    open_only: bool,
  ) -> impl Future<Output = Result<Vec<AttendanceSession>, Self::Error>> + Send + '_;

  /// Whether the subject has an open session in any group.
  fn subject_has_open_session(
    &self,
    subject_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Points ledger ─────────────────────────────────────────────────────

  fn record_points(
    &self,
    input: NewPoints,
  ) -> impl Future<Output = Result<PointsEntry, Self::Error>> + Send + '_;

  /// Ledger balance per subject that has any entries.
  fn points_totals(
    &self,
  ) -> impl Future<Output = Result<Vec<PointsTotal>, Self::Error>> + Send + '_;
}
