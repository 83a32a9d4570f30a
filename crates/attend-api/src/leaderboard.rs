//! Handlers for the points ledger and leaderboards.
//!
//! Boards are recomputed on every request. `group_ids` is accepted as a
//! comma-separated list; when absent, every registered group counts.

use std::sync::Arc;

use attend_core::{
  Tracker,
  leaderboard::{LeaderboardEntry, Leaders},
  points::{NewPoints, PointsEntry},
  store::AttendanceStore,
};
use axum::{
  Json,
  extract::{Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  caller::{Caller, Role},
  error::ApiError,
  instant,
};

// ─── Award ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AwardBody {
  pub subject_id:    Uuid,
  /// May be negative for deductions.
  pub amount:        i64,
  pub reason:        Option<String>,
  pub awarded_at_ms: Option<i64>,
}

/// `POST /points`: returns 201 + the ledger entry.
pub async fn award<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  caller: Caller,
  Json(body): Json<AwardBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AttendanceStore + 'static,
{
  caller.require(Role::Admin)?;
  let entry: PointsEntry = tracker
    .record_points(NewPoints {
      subject_id: body.subject_id,
      amount:     body.amount,
      reason:     body.reason,
      awarded_at: instant(body.awarded_at_ms)?,
    })
    .await?;
  Ok((StatusCode::CREATED, Json(entry)))
}

// ─── Boards ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct BoardParams {
  /// Comma-separated group ids, e.g. `a,b`. An empty list means every group.
  pub group_ids: Option<String>,
}

impl BoardParams {
  fn group_ids(&self) -> Result<Option<Vec<Uuid>>, ApiError> {
    let Some(raw) = &self.group_ids else {
      return Ok(None);
    };
    raw
      .split(',')
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(|s| {
        Uuid::parse_str(s).map_err(|_| ApiError::BadRequest(format!("invalid group id: {s}")))
      })
      .collect::<Result<Vec<_>, _>>()
      .map(|ids| (!ids.is_empty()).then_some(ids))
  }
}

/// `GET /leaderboard/points`
pub async fn points<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  _caller: Caller,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError>
where
  S: AttendanceStore + 'static,
{
  Ok(Json(tracker.points_board().await?))
}

/// `GET /leaderboard/hours[?group_ids=a,b]`: metric is attended milliseconds.
pub async fn hours<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  _caller: Caller,
  Query(params): Query<BoardParams>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError>
where
  S: AttendanceStore + 'static,
{
  let groups = params.group_ids()?;
  Ok(Json(tracker.hours_board(groups.as_deref()).await?))
}

/// `GET /leaderboard/leaders[?group_ids=a,b]`
pub async fn leaders<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  _caller: Caller,
  Query(params): Query<BoardParams>,
) -> Result<Json<Leaders>, ApiError>
where
  S: AttendanceStore + 'static,
{
  let groups = params.group_ids()?;
  Ok(Json(tracker.leaders(groups.as_deref()).await?))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn group_ids_parse_comma_list() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let params = BoardParams { group_ids: Some(format!("{a}, {b},")) };
    assert_eq!(params.group_ids().unwrap(), Some(vec![a, b]));
  }

  #[test]
  fn group_ids_absent_means_all() {
    assert_eq!(BoardParams::default().group_ids().unwrap(), None);
  }

  #[test]
  fn group_ids_empty_means_all() {
    for raw in ["", " ", ",,"] {
      let params = BoardParams { group_ids: Some(raw.into()) };
      assert_eq!(params.group_ids().unwrap(), None, "{raw:?}");
    }
  }

  #[test]
  fn group_ids_reject_garbage() {
    let params = BoardParams { group_ids: Some("nope".into()) };
    assert!(matches!(params.group_ids(), Err(ApiError::BadRequest(_))));
  }
}
