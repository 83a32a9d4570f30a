//! JSON REST API for attendance tracking.
//!
//! Exposes an axum [`Router`] backed by a [`Tracker`] over any
//! [`attend_core::store::AttendanceStore`]. Authentication, TLS and transport
//! are the caller's responsibility: the mounting layer must insert a
//! [`Caller`] into each request's extensions.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", attend_api::api_router(tracker.clone()))
//! ```

pub mod beacons;
pub mod caller;
pub mod directory;
pub mod error;
pub mod leaderboard;
pub mod sessions;
pub mod sightings;

use std::sync::Arc;

use attend_core::{Tracker, store::AttendanceStore};
use axum::{
  Router,
  routing::{delete, get, post, put},
};
use chrono::{DateTime, Utc};

pub use caller::{Caller, Role};
pub use error::ApiError;

/// Build a fully-materialised API router for `tracker`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(tracker: Arc<Tracker<S>>) -> Router<()>
where
  S: AttendanceStore + 'static,
{
  Router::new()
    // Directory
    .route("/subjects", get(directory::list_subjects::<S>))
    .route("/subjects/{id}", put(directory::put_subject::<S>))
    .route("/groups", get(directory::list_groups::<S>))
    .route("/groups/{id}", put(directory::put_group::<S>))
    // Sightings & sessions
    .route("/sightings", post(sightings::observe::<S>))
    .route("/groups/{id}/sessions", get(sessions::list::<S>))
    .route("/groups/{id}/sweep", post(sessions::sweep::<S>))
    .route("/groups/{id}/durations", get(sessions::durations::<S>))
    .route("/sessions/{id}/close", post(sessions::close::<S>))
    // Beacons
    .route("/beacons", get(beacons::list::<S>).post(beacons::pair::<S>))
    .route("/beacons/{id}", delete(beacons::unpair::<S>))
    // Leaderboards
    .route("/points", post(leaderboard::award::<S>))
    .route("/leaderboard/points", get(leaderboard::points::<S>))
    .route("/leaderboard/hours", get(leaderboard::hours::<S>))
    .route("/leaderboard/leaders", get(leaderboard::leaders::<S>))
    .with_state(tracker)
}

/// Interpret an optional epoch-millisecond timestamp, defaulting to now.
pub(crate) fn instant(ms: Option<i64>) -> Result<DateTime<Utc>, ApiError> {
  let Some(ms) = ms else {
    return Ok(Utc::now());
  };
  if ms < 0 {
    return Err(ApiError::BadRequest(format!("timestamp must not be negative: {ms}")));
  }
  DateTime::from_timestamp_millis(ms)
    .ok_or_else(|| ApiError::BadRequest(format!("timestamp out of range: {ms}")))
}
