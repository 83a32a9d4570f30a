//! Handlers for `/beacons` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/beacons` | Optional `?owner_id=` |
//! | `POST`   | `/beacons` | Body: [`PairBody`]; admins may pair for others |
//! | `DELETE` | `/beacons/:id` | Owner only; 204 |

use std::sync::Arc;

use attend_core::{
  Tracker,
  beacon::{Beacon, BeaconKey, PairRequest},
  store::AttendanceStore,
};
use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{caller::Caller, error::ApiError};

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub owner_id: Option<Uuid>,
}

/// `GET /beacons[?owner_id=<id>]`
pub async fn list<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  _caller: Caller,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Beacon>>, ApiError>
where
  S: AttendanceStore + 'static,
{
  Ok(Json(tracker.list_beacons(params.owner_id).await?))
}

// ─── Pair ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PairBody {
  /// Raw vendor identifier, e.g. `abc/1/2`.
  pub identifier: String,
  /// Defaults to the caller.
  pub owner_id:   Option<Uuid>,
  pub label:      Option<String>,
}

/// `POST /beacons`: returns the paired beacon.
pub async fn pair<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  caller: Caller,
  Json(body): Json<PairBody>,
) -> Result<Json<Beacon>, ApiError>
where
  S: AttendanceStore + 'static,
{
  let key = BeaconKey::from_raw(&body.identifier).ok_or_else(|| {
    ApiError::BadRequest(format!("not a beacon identifier: {:?}", body.identifier))
  })?;
  let request = PairRequest {
    key,
    owner_id: body.owner_id.unwrap_or(caller.subject_id),
    label: body.label,
  };
  Ok(Json(tracker.pair(&caller.actor(), request).await?))
}

// ─── Unpair ───────────────────────────────────────────────────────────────────

/// `DELETE /beacons/:id`
pub async fn unpair<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  caller: Caller,
  Path(beacon_id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: AttendanceStore + 'static,
{
  tracker.unpair(&caller.actor(), beacon_id).await?;
  Ok(StatusCode::NO_CONTENT)
}
