//! Handlers for session reads, the expiry sweep and explicit closes.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/groups/:id/sessions` | Optional `?open=true` |
//! | `POST` | `/groups/:id/sweep` | Admin. Optional `?now_ms=`; returns `{"closed":n}` |
//! | `GET`  | `/groups/:id/durations` | Per-subject [`DurationSummary`] |
//! | `POST` | `/sessions/:id/close` | Admin. Closes at the last sighting |

use std::sync::Arc;

use attend_core::{
  Tracker,
  duration::DurationSummary,
  session::AttendanceSession,
  store::AttendanceStore,
};
use axum::{
  Json,
  extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  caller::{Caller, Role},
  error::ApiError,
  instant,
};

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  /// Only sessions without an end time. Default `false`.
  #[serde(default)]
  pub open: bool,
}

/// `GET /groups/:id/sessions[?open=true]`
pub async fn list<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  _caller: Caller,
  Path(group_id): Path<Uuid>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<AttendanceSession>>, ApiError>
where
  S: AttendanceStore + 'static,
{
  Ok(Json(tracker.list_sessions(group_id, params.open).await?))
}

// ─── Sweep ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SweepParams {
  pub now_ms: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SweepResult {
  pub closed: usize,
}

/// `POST /groups/:id/sweep[?now_ms=...]`
pub async fn sweep<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  caller: Caller,
  Path(group_id): Path<Uuid>,
  Query(params): Query<SweepParams>,
) -> Result<Json<SweepResult>, ApiError>
where
  S: AttendanceStore + 'static,
{
  caller.require(Role::Admin)?;
  let now = instant(params.now_ms)?;
  let closed = tracker.sweep_expired(group_id, now).await?;
  Ok(Json(SweepResult { closed }))
}

// ─── Durations ────────────────────────────────────────────────────────────────

/// `GET /groups/:id/durations`
pub async fn durations<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  _caller: Caller,
  Path(group_id): Path<Uuid>,
) -> Result<Json<Vec<DurationSummary>>, ApiError>
where
  S: AttendanceStore + 'static,
{
  Ok(Json(tracker.summarize(group_id).await?))
}

// ─── Close ────────────────────────────────────────────────────────────────────

/// `POST /sessions/:id/close`
pub async fn close<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  caller: Caller,
  Path(session_id): Path<Uuid>,
) -> Result<Json<AttendanceSession>, ApiError>
where
  S: AttendanceStore + 'static,
{
  caller.require(Role::Admin)?;
  Ok(Json(tracker.close_session(session_id).await?))
}
