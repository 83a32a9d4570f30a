//! Handler for `POST /sightings`.
//!
//! Scanners post one body per observation. Sightings of malformed or unpaired
//! identifiers are accepted and answered with `{"outcome":"unrecognized"}`.

use std::sync::Arc;

use attend_core::{Observation, Sighting, Tracker, store::AttendanceStore};
use axum::{
  Json,
  extract::State,
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

#[derive(Debug, Deserialize)]
pub struct SightingBody {
  pub group_id:       Uuid,
  /// Raw vendor identifier, e.g. `abc/1/2`.
  pub identifier:     String,
  /// Epoch milliseconds. Defaults to the time of receipt.
  pub observed_at_ms: Option<i64>,
  /// Defaults to the caller's subject id.
  pub scanner_id:     Option<String>,
}

/// `POST /sightings`: 201 when a session was opened, otherwise 200.
pub async fn observe<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  caller: Caller,
  Json(body): Json<SightingBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AttendanceStore + 'static,
{
  caller.require(Role::Scanner)?;

  let sighting = Sighting {
    group_id:       body.group_id,
    raw_identifier: body.identifier,
    observed_at:    instant(body.observed_at_ms)?,
    scanner_id:     body
      .scanner_id
      .unwrap_or_else(|| caller.subject_id.to_string()),
  };
  let outcome = tracker.observe(sighting).await?;

  let status = match outcome {
    Observation::Opened { .. } => StatusCode::CREATED,
    _ => StatusCode::OK,
  };
  Ok((status, Json(outcome)))
}
