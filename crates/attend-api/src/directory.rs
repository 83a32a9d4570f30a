//! Handlers for `/subjects` and `/groups`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/subjects` | |
//! | `PUT`  | `/subjects/:id` | Admin. Body: `{"display_name":"..."}` |
//! | `GET`  | `/groups` | |
//! | `PUT`  | `/groups/:id` | Admin. Body: `{"name":"..."}` |

use std::sync::Arc;

use attend_core::{
  Tracker,
  store::AttendanceStore,
  subject::{Group, Subject},
};
use axum::{
  Json,
  extract::{Path, State},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  caller::{Caller, Role},
  error::ApiError,
};

// ─── Subjects ─────────────────────────────────────────────────────────────────

/// `GET /subjects`
pub async fn list_subjects<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  _caller: Caller,
) -> Result<Json<Vec<Subject>>, ApiError>
where
  S: AttendanceStore + 'static,
{
  Ok(Json(tracker.list_subjects().await?))
}

#[derive(Debug, Deserialize)]
pub struct SubjectBody {
  pub display_name: String,
}

/// `PUT /subjects/:id`
pub async fn put_subject<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  caller: Caller,
  Path(id): Path<Uuid>,
  Json(body): Json<SubjectBody>,
) -> Result<Json<Subject>, ApiError>
where
  S: AttendanceStore + 'static,
{
  caller.require(Role::Admin)?;
  let name = body.display_name.trim();
  if name.is_empty() {
    return Err(ApiError::BadRequest("display_name must not be empty".into()));
  }
  Ok(Json(tracker.put_subject(id, name.to_owned()).await?))
}

// ─── Groups ───────────────────────────────────────────────────────────────────

/// `GET /groups`
pub async fn list_groups<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  _caller: Caller,
) -> Result<Json<Vec<Group>>, ApiError>
where
  S: AttendanceStore + 'static,
{
  Ok(Json(tracker.list_groups().await?))
}

#[derive(Debug, Deserialize)]
pub struct GroupBody {
  pub name: String,
}

/// `PUT /groups/:id`
pub async fn put_group<S>(
  State(tracker): State<Arc<Tracker<S>>>,
  caller: Caller,
  Path(id): Path<Uuid>,
  Json(body): Json<GroupBody>,
) -> Result<Json<Group>, ApiError>
where
  S: AttendanceStore + 'static,
{
  caller.require(Role::Admin)?;
  Ok(Json(tracker.put_group(id, body.name).await?))
}
