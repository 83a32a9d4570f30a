//! The authenticated caller of an API request.
//!
//! Authentication happens outside this crate. Whatever layer verifies the
//! credentials inserts a [`Caller`] into the request extensions; handlers
//! extract it and check the role they need.

use attend_core::subject::Actor;
use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

/// Caller roles, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Member,
  Scanner,
  Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
  pub subject_id: Uuid,
  pub role:       Role,
}

impl Caller {
  /// Fails with 403 unless the caller holds at least `role`.
  pub fn require(&self, role: Role) -> Result<(), ApiError> {
    if self.role >= role {
      Ok(())
    } else {
      Err(ApiError::Forbidden(format!("requires the {role:?} role").to_lowercase()))
    }
  }

  pub fn actor(&self) -> Actor {
    Actor {
      subject_id: self.subject_id,
      elevated:   self.role == Role::Admin,
    }
  }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    parts
      .extensions
      .get::<Caller>()
      .copied()
      .ok_or(ApiError::Unauthenticated)
  }
}
