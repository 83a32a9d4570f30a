//! HTTP server for attendance tracking.
//!
//! Wraps the JSON API from `attend-api` with Basic authentication, request
//! tracing and a background expiry sweeper.

pub mod auth;
pub mod error;

pub use error::Error;

use std::{path::PathBuf, sync::Arc, time::Duration};

use attend_api::{Caller, Role};
use attend_core::{Tracker, TrackingConfig, store::AttendanceStore};
use axum::{
  Router,
  extract::{Request, State},
  middleware::{self, Next},
  response::{IntoResponse, Response},
  routing::get,
};
use chrono::Utc;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::warn;
use uuid::Uuid;

use auth::{AuthConfig, verify_auth};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
  #[serde(default)]
  pub tracking:   TrackingConfig,
  #[serde(default)]
  pub users:      Vec<UserConfig>,
}

/// One account allowed to call the API.
#[derive(Deserialize, Clone)]
pub struct UserConfig {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
  /// The subject this account acts as.
  pub subject_id:    Uuid,
  pub role:          Role,
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through the middleware.
#[derive(Clone)]
pub struct AppState<S: AttendanceStore> {
  pub tracker: Arc<Tracker<S>>,
  pub config:  Arc<ServerConfig>,
  pub auth:    Arc<AuthConfig>,
}

impl<S: AttendanceStore> AppState<S> {
  pub fn new(store: S, config: ServerConfig) -> Self {
    Self {
      tracker: Arc::new(Tracker::new(store, config.tracking)),
      auth:    Arc::new(AuthConfig { users: config.users.clone() }),
      config:  Arc::new(config),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the server's axum [`Router`]: `/health` plus the API under `/api`.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: AttendanceStore + Clone + 'static,
{
  let api = attend_api::api_router(state.tracker.clone())
    .layer(middleware::from_fn_with_state(state, require_auth::<S>));

  Router::new()
    .route("/health", get(health))
    .nest("/api", api)
    .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str { "ok" }

/// Resolve the Basic credentials into a [`Caller`] for the API handlers.
async fn require_auth<S>(
  State(state): State<AppState<S>>,
  mut req: Request,
  next: Next,
) -> Response
where
  S: AttendanceStore + Clone + 'static,
{
  match verify_auth(req.headers(), &state.auth) {
    Ok(caller) => {
      req.extensions_mut().insert::<Caller>(caller);
      next.run(req).await
    }
    Err(e) => e.into_response(),
  }
}

// ─── Background sweeper ──────────────────────────────────────────────────────

/// Run [`Tracker::sweep_all`] every `interval`. A zero interval disables the
/// sweeper and returns `None`.
pub fn spawn_sweeper<S>(tracker: Arc<Tracker<S>>, interval: Duration) -> Option<JoinHandle<()>>
where
  S: AttendanceStore + 'static,
{
  if interval.is_zero() {
    return None;
  }

  Some(tokio::spawn(async move {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      if let Err(e) = tracker.sweep_all(Utc::now()).await {
        warn!(error = %e, "background sweep failed");
      }
    }
  }))
}

#[cfg(test)]
mod tests {
  use super::*;

  use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
  use attend_core::Sighting;
  use attend_store_sqlite::SqliteStore;
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use base64::Engine as _;
  use base64::engine::general_purpose::STANDARD as B64;
  use chrono::TimeZone;
  use rand_core::OsRng;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;

  const PASSWORD: &str = "secret";

  struct Harness {
    state:   AppState<SqliteStore>,
    scanner: Uuid,
    member:  Uuid,
    group:   Uuid,
  }

  async fn harness() -> Harness {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let salt  = SaltString::generate(&mut OsRng);
    let hash  = Argon2::default()
      .hash_password(PASSWORD.as_bytes(), &salt)
      .unwrap()
      .to_string();

    let admin = Uuid::new_v4();
    let scanner = Uuid::new_v4();
    let member = Uuid::new_v4();
    let user = |username: &str, subject_id: Uuid, role: Role| UserConfig {
      username: username.to_string(),
      password_hash: hash.clone(),
      subject_id,
      role,
    };

    let state = AppState::new(store, ServerConfig {
      host:       "127.0.0.1".to_string(),
      port:       8080,
      store_path: PathBuf::from(":memory:"),
      tracking:   TrackingConfig::default(),
      users:      vec![
        user("admin", admin, Role::Admin),
        user("door", scanner, Role::Scanner),
        user("sam", member, Role::Member),
      ],
    });

    let group = Uuid::new_v4();
    state.tracker.put_group(group, "Build night".into()).await.unwrap();
    state.tracker.put_subject(member, "Sam".into()).await.unwrap();

    Harness { state, scanner, member, group }
  }

  fn auth_header(user: &str) -> String {
    format!("Basic {}", B64.encode(format!("{user}:{PASSWORD}")))
  }

  async fn send(
    h:      &Harness,
    method: &str,
    uri:    &str,
    user:   Option<&str>,
    body:   Option<Value>,
  ) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
      builder = builder.header(header::AUTHORIZATION, auth_header(user));
    }
    let req = match body {
      Some(body) => builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap(),
      None => builder.body(Body::empty()).unwrap(),
    };

    let resp = router(h.state.clone()).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
      .await
      .unwrap();
    let value = if bytes.is_empty() {
      Value::Null
    } else {
      serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
  }

  #[tokio::test]
  async fn health_needs_no_auth() {
    let h = harness().await;
    let (status, _) = send(&h, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
  }

  #[tokio::test]
  async fn api_rejects_missing_credentials() {
    let h = harness().await;
    let req = Request::builder()
      .uri("/api/groups")
      .body(Body::empty())
      .unwrap();
    let resp = router(h.state.clone()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));
  }

  #[tokio::test]
  async fn members_cannot_post_sightings() {
    let h = harness().await;
    let body = json!({ "group_id": h.group, "identifier": "abc/1/2" });
    let (status, _) = send(&h, "POST", "/api/sightings", Some("sam"), Some(body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
  }

  #[tokio::test]
  async fn negative_timestamp_is_bad_request() {
    let h = harness().await;
    let body = json!({ "group_id": h.group, "identifier": "abc/1/2", "observed_at_ms": -5 });
    let (status, _) = send(&h, "POST", "/api/sightings", Some("door"), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn sighting_for_unknown_group_is_not_found() {
    let h = harness().await;
    let body = json!({ "group_id": Uuid::new_v4(), "identifier": "abc/1/2" });
    let (status, value) = send(&h, "POST", "/api/sightings", Some("door"), Some(body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(value["error"].as_str().is_some());
  }

  #[tokio::test]
  async fn attendance_round_trip() {
    let h = harness().await;
    let g = h.group;

    let (status, beacon) =
      send(&h, "POST", "/api/beacons", Some("sam"), Some(json!({ "identifier": "abc/1/2" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(beacon["owner_id"], json!(h.member));
    assert_eq!(beacon["key"], "ibeacon:abc:1:2");

    let sighting = |ms: i64| json!({ "group_id": g, "identifier": "ABC/1/2", "observed_at_ms": ms });
    let (status, first) =
      send(&h, "POST", "/api/sightings", Some("door"), Some(sighting(1_000_000))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["outcome"], "opened");
    assert_eq!(first["session"]["scanner_id"], json!(h.scanner.to_string()));

    let (status, second) =
      send(&h, "POST", "/api/sightings", Some("door"), Some(sighting(1_030_000))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["outcome"], "unchanged");

    let uri = format!("/api/groups/{g}/sessions?open=true");
    let (_, open) = send(&h, "GET", &uri, Some("sam"), None).await;
    assert_eq!(open.as_array().map(Vec::len), Some(1));

    let uri = format!("/api/groups/{g}/sweep?now_ms=1331001");
    let (status, _) = send(&h, "POST", &uri, Some("sam"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, swept) = send(&h, "POST", &uri, Some("admin"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(swept["closed"], 1);

    let uri = format!("/api/groups/{g}/durations");
    let (_, durations) = send(&h, "GET", &uri, Some("sam"), None).await;
    assert_eq!(durations[0]["subject_id"], json!(h.member));
    assert_eq!(durations[0]["duration_ms"], 30_000);
  }

  #[tokio::test]
  async fn pairing_taken_beacon_conflicts() {
    let h = harness().await;
    let body = json!({ "identifier": "abc/1/2" });
    let (status, _) = send(&h, "POST", "/api/beacons", Some("sam"), Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);

    h.state.tracker.put_subject(h.scanner, "Door".into()).await.unwrap();
    let (status, _) = send(&h, "POST", "/api/beacons", Some("door"), Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
      &h,
      "POST",
      "/api/beacons",
      Some("sam"),
      Some(json!({ "identifier": "not-a-beacon" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn unpair_is_owner_only() {
    let h = harness().await;
    let (_, beacon) =
      send(&h, "POST", "/api/beacons", Some("sam"), Some(json!({ "identifier": "abc/1/2" }))).await;
    let uri = format!("/api/beacons/{}", beacon["beacon_id"].as_str().unwrap());

    let (status, _) = send(&h, "DELETE", &uri, Some("admin"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&h, "DELETE", &uri, Some("sam"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&h, "DELETE", &uri, Some("sam"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn points_board_over_http() {
    let h = harness().await;
    let award = json!({ "subject_id": h.member, "amount": 4, "reason": "cleanup" });

    let (status, _) = send(&h, "POST", "/api/points", Some("sam"), Some(award.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&h, "POST", "/api/points", Some("admin"), Some(award)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, board) = send(&h, "GET", "/api/leaderboard/points", Some("sam"), None).await;
    assert_eq!(board[0]["subject_id"], json!(h.member));
    assert_eq!(board[0]["rank"], 1);
    assert_eq!(board[0]["metric"], 4);

    let (status, _) =
      send(&h, "GET", "/api/leaderboard/hours?group_ids=bogus", Some("sam"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn empty_group_filter_covers_every_group() {
    let h = harness().await;
    send(&h, "POST", "/api/beacons", Some("sam"), Some(json!({ "identifier": "abc/1/2" }))).await;
    for ms in [1_000_000, 1_100_000] {
      let body = json!({ "group_id": h.group, "identifier": "abc/1/2", "observed_at_ms": ms });
      send(&h, "POST", "/api/sightings", Some("door"), Some(body)).await;
    }

    for uri in ["/api/leaderboard/hours", "/api/leaderboard/hours?group_ids="] {
      let (status, board) = send(&h, "GET", uri, Some("sam"), None).await;
      assert_eq!(status, StatusCode::OK, "{uri}");
      assert_eq!(board[0]["subject_id"], json!(h.member), "{uri}");
      assert_eq!(board[0]["metric"], 100_000, "{uri}");
    }
  }

  #[tokio::test]
  async fn admin_upserts_directory_entries() {
    let h = harness().await;
    let id = Uuid::new_v4();
    let uri = format!("/api/subjects/{id}");

    let body = json!({ "display_name": "Kai" });
    let (status, _) = send(&h, "PUT", &uri, Some("door"), Some(body.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, subject) = send(&h, "PUT", &uri, Some("admin"), Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(subject["display_name"], "Kai");

    let (_, subjects) = send(&h, "GET", "/api/subjects", Some("sam"), None).await;
    assert_eq!(subjects.as_array().map(Vec::len), Some(2));
  }

  #[tokio::test]
  async fn sweeper_closes_stale_sessions() {
    let h = harness().await;
    let tracker = h.state.tracker.clone();
    tracker
      .pair(
        &attend_core::subject::Actor::member(h.member),
        attend_core::beacon::PairRequest {
          key:      attend_core::beacon::BeaconKey::from_raw("abc/1/2").unwrap(),
          owner_id: h.member,
          label:    None,
        },
      )
      .await
      .unwrap();
    tracker
      .observe(Sighting {
        group_id:       h.group,
        raw_identifier: "abc/1/2".into(),
        observed_at:    Utc.timestamp_opt(1000, 0).unwrap(),
        scanner_id:     "door".into(),
      })
      .await
      .unwrap();

    assert!(spawn_sweeper(tracker.clone(), Duration::ZERO).is_none());

    let handle = spawn_sweeper(tracker.clone(), Duration::from_millis(10)).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.abort();

    assert!(tracker.list_open_sessions(h.group).await.unwrap().is_empty());
  }
}
