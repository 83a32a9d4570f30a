//! [`Tracker`]: the service that turns sightings into sessions and sessions
//! into durations and leaderboards.
//!
//! All persistent state lives behind an [`AttendanceStore`]. The tracker adds
//! two pieces of in-process state:
//!
//! - per-slot async locks, so reconciliation of one (group, subject) pair is
//!   never interleaved within this process, and
//! - a liveness map holding the freshest sighting of each open session whose
//!   persisted `last_seen_at` is lagging behind because of throttling.
//!
//! Both live in memory, so one store must be served by a single tracker.
//! A second instance sharing the store keeps the store's invariants (at most
//! one open session per slot, no close before the persisted last sighting),
//! but cannot see the other's throttled sightings and may expire a session
//! at an older `last_seen_at` than the first instance observed.

use std::{
  collections::HashMap,
  sync::{Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result, TrackingConfig,
  beacon::{Beacon, BeaconKey, NewBeacon, PairRequest, PairingDecision, decide_pairing},
  duration::{DurationSummary, summarize_sessions},
  leaderboard::{DEFAULT_TIE_BREAKERS, LeaderboardEntry, Leaders, dual_leader, rank},
  locks::SlotLocks,
  points::{NewPoints, PointsEntry},
  session::{AttendanceSession, NewSession, Refresh, is_expired, refresh_decision},
  store::AttendanceStore,
  subject::{Actor, Group, Subject},
};

/// How many times a conditional write is re-attempted after losing a race
/// before [`Error::RaceLost`] is returned.
const WRITE_ATTEMPTS: usize = 2;

// ─── Inputs & outputs ────────────────────────────────────────────────────────

/// A single scanner observation.
#[derive(Debug, Clone)]
pub struct Sighting {
  pub group_id:       Uuid,
  /// Vendor identifier as reported by the scanner, e.g. `abc/1/2`.
  pub raw_identifier: String,
  pub observed_at:    DateTime<Utc>,
  pub scanner_id:     String,
}

/// What [`Tracker::observe`] did with a sighting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Observation {
  /// The identifier is malformed or not paired to anyone. Nothing was written.
  Unrecognized,
  /// No session was open for the slot; this one was created.
  Opened { session: AttendanceSession },
  /// The open session's `last_seen_at` was persisted.
  Refreshed {
    session_id:   Uuid,
    last_seen_at: DateTime<Utc>,
  },
  /// The open session was already fresh enough; nothing was written.
  Unchanged { session_id: Uuid },
}

// ─── Tracker ─────────────────────────────────────────────────────────────────

pub struct Tracker<S> {
  store:    S,
  config:   TrackingConfig,
  locks:    SlotLocks,
  liveness: Mutex<HashMap<Uuid, DateTime<Utc>>>,
}

impl<S: AttendanceStore> Tracker<S> {
  pub fn new(store: S, config: TrackingConfig) -> Self {
    Self {
      store,
      config,
      locks: SlotLocks::new(),
      liveness: Mutex::new(HashMap::new()),
    }
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn config(&self) -> &TrackingConfig { &self.config }

  // ── Liveness map ──────────────────────────────────────────────────────

  fn note_sighting(&self, session_id: Uuid, at: DateTime<Utc>) {
    let mut map = self.liveness.lock().unwrap_or_else(PoisonError::into_inner);
    let slot = map.entry(session_id).or_insert(at);
    *slot = (*slot).max(at);
  }

  fn forget(&self, session_id: Uuid) {
    self
      .liveness
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(&session_id);
  }

  /// The later of the persisted `last_seen_at` and any unpersisted sighting.
  fn freshest(&self, session: &AttendanceSession) -> DateTime<Utc> {
    let map = self.liveness.lock().unwrap_or_else(PoisonError::into_inner);
    map
      .get(&session.session_id)
      .map_or(session.last_seen_at, |seen| (*seen).max(session.last_seen_at))
  }

  // ── Lookups ───────────────────────────────────────────────────────────

  async fn require_group(&self, group_id: Uuid) -> Result<Group> {
    self
      .store
      .get_group(group_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::GroupNotFound(group_id))
  }

  async fn require_subject(&self, subject_id: Uuid) -> Result<Subject> {
    self
      .store
      .get_subject(subject_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::SubjectNotFound(subject_id))
  }

  pub async fn put_subject(&self, subject_id: Uuid, display_name: String) -> Result<Subject> {
    self
      .store
      .put_subject(subject_id, display_name)
      .await
      .map_err(Error::store)
  }

  pub async fn list_subjects(&self) -> Result<Vec<Subject>> {
    self.store.list_subjects().await.map_err(Error::store)
  }

  pub async fn put_group(&self, group_id: Uuid, name: String) -> Result<Group> {
    self.store.put_group(group_id, name).await.map_err(Error::store)
  }

  pub async fn list_groups(&self) -> Result<Vec<Group>> {
    self.store.list_groups().await.map_err(Error::store)
  }

  // ── Identity registry ─────────────────────────────────────────────────

  /// The subject owning `key`, or `None` for unpaired hardware.
  pub async fn resolve_owner(&self, key: &BeaconKey) -> Result<Option<Uuid>> {
    Ok(
      self
        .store
        .find_beacon_by_key(key.clone())
        .await
        .map_err(Error::store)?
        .map(|b| b.owner_id),
    )
  }

  pub async fn list_beacons(&self, owner_id: Option<Uuid>) -> Result<Vec<Beacon>> {
    self.store.list_beacons(owner_id).await.map_err(Error::store)
  }

  /// Pair a beacon with its owner. See [`decide_pairing`] for the rules.
  pub async fn pair(&self, actor: &Actor, request: PairRequest) -> Result<Beacon> {
    self.require_subject(request.owner_id).await?;

    for _ in 0..WRITE_ATTEMPTS {
      let existing = self
        .store
        .find_beacon_by_key(request.key.clone())
        .await
        .map_err(Error::store)?;

      let owner_active = match &existing {
        Some(b) if actor.elevated && b.owner_id != request.owner_id => self
          .store
          .subject_has_open_session(b.owner_id)
          .await
          .map_err(Error::store)?,
        _ => false,
      };

      match decide_pairing(existing, &request, actor, owner_active)? {
        PairingDecision::Create => {
          let input = NewBeacon {
            key:      request.key.clone(),
            owner_id: request.owner_id,
            label:    request.label.clone(),
          };
          if let Some(beacon) = self.store.insert_beacon(input).await.map_err(Error::store)? {
            info!(key = %beacon.key, owner_id = %beacon.owner_id, "beacon paired");
            return Ok(beacon);
          }
        }
        PairingDecision::Relabel(beacon) => {
          if request.label.is_none() || request.label == beacon.label {
            return Ok(beacon);
          }
          if let Some(beacon) = self
            .store
            .update_beacon(beacon.beacon_id, beacon.owner_id, beacon.owner_id, request.label.clone())
            .await
            .map_err(Error::store)?
          {
            return Ok(beacon);
          }
        }
        PairingDecision::Reassign(beacon) => {
          if let Some(updated) = self
            .store
            .update_beacon(beacon.beacon_id, beacon.owner_id, request.owner_id, request.label.clone())
            .await
            .map_err(Error::store)?
          {
            info!(
              key = %updated.key,
              from = %beacon.owner_id,
              to = %updated.owner_id,
              by = %actor.subject_id,
              "beacon reassigned"
            );
            return Ok(updated);
          }
        }
      }
    }

    Err(Error::RaceLost)
  }

  /// Remove a pairing. Only the current owner may do this.
  pub async fn unpair(&self, actor: &Actor, beacon_id: Uuid) -> Result<()> {
    let beacon = self
      .store
      .get_beacon(beacon_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::BeaconNotFound(beacon_id))?;

    if beacon.owner_id != actor.subject_id {
      return Err(Error::NotBeaconOwner { beacon_id, subject_id: actor.subject_id });
    }

    if !self.store.delete_beacon(beacon_id).await.map_err(Error::store)? {
      return Err(Error::BeaconNotFound(beacon_id));
    }
    info!(key = %beacon.key, owner_id = %beacon.owner_id, "beacon unpaired");
    Ok(())
  }

  // ── Sighting reconciler ───────────────────────────────────────────────

  /// Reconcile one sighting into the session store.
  ///
  /// Safe to retry: repeats inside the throttle window neither write nor
  /// open sessions.
  pub async fn observe(&self, sighting: Sighting) -> Result<Observation> {
    let Sighting { group_id, raw_identifier, observed_at, scanner_id } = sighting;
    self.require_group(group_id).await?;

    let Some(key) = BeaconKey::from_raw(&raw_identifier) else {
      debug!(%group_id, raw = %raw_identifier, "ignoring malformed identifier");
      return Ok(Observation::Unrecognized);
    };
    let Some(subject_id) = self.resolve_owner(&key).await? else {
      debug!(%group_id, %key, "ignoring unpaired beacon");
      return Ok(Observation::Unrecognized);
    };

    let _slot = self.locks.lock(group_id, subject_id).await;

    for _ in 0..WRITE_ATTEMPTS {
      let open = self
        .store
        .find_open_session(group_id, subject_id)
        .await
        .map_err(Error::store)?;

      let Some(session) = open else {
        let input = NewSession {
          group_id,
          subject_id,
          observed_at,
          scanner_id: scanner_id.clone(),
        };
        if let Some(session) = self.store.insert_open_session(input).await.map_err(Error::store)? {
          info!(
            session_id = %session.session_id,
            %group_id,
            %subject_id,
            scanner_id = %session.scanner_id,
            "session opened"
          );
          return Ok(Observation::Opened { session });
        }
        continue;
      };

      let session_id = session.session_id;
      match refresh_decision(session.last_seen_at, observed_at, self.config.throttle()) {
        Refresh::Stale => return Ok(Observation::Unchanged { session_id }),
        Refresh::Throttle => {
          self.note_sighting(session_id, observed_at);
          debug!(%session_id, %observed_at, "refresh throttled");
          return Ok(Observation::Unchanged { session_id });
        }
        Refresh::Persist => {
          if self
            .store
            .refresh_session(session_id, observed_at)
            .await
            .map_err(Error::store)?
          {
            self.note_sighting(session_id, observed_at);
            debug!(%session_id, %observed_at, "session refreshed");
            return Ok(Observation::Refreshed { session_id, last_seen_at: observed_at });
          }
          // Closed underneath us; the next pass opens a fresh session.
          self.forget(session_id);
        }
      }
    }

    warn!(%group_id, %subject_id, "sighting lost repeated races");
    Err(Error::RaceLost)
  }

  /// Close a session explicitly at its last sighting. Closing an already
  /// closed session returns it unchanged.
  pub async fn close_session(&self, session_id: Uuid) -> Result<AttendanceSession> {
    for _ in 0..WRITE_ATTEMPTS {
      let session = self.require_session(session_id).await?;
      if !session.is_open() {
        return Ok(session);
      }

      let _slot = self.locks.lock(session.group_id, session.subject_id).await;
      let end = self.freshest(&session);
      if self
        .store
        .close_session(session_id, end)
        .await
        .map_err(Error::store)?
      {
        self.forget(session_id);
        info!(%session_id, end_time = %end, "session closed");
        return self.require_session(session_id).await;
      }
    }
    Err(Error::RaceLost)
  }

  async fn require_session(&self, session_id: Uuid) -> Result<AttendanceSession> {
    self
      .store
      .get_session(session_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::SessionNotFound(session_id))
  }

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Sessions of a group with unpersisted sightings folded into the open
  /// ones' `last_seen_at`.
  async fn current_sessions(&self, group_id: Uuid, open_only: bool) -> Result<Vec<AttendanceSession>> {
    let mut sessions = self
      .store
      .list_sessions(group_id, open_only)
      .await
      .map_err(Error::store)?;
    for s in sessions.iter_mut().filter(|s| s.is_open()) {
      s.last_seen_at = self.freshest(s);
    }
    Ok(sessions)
  }

  /// Open sessions of a group. Each `last_seen_at` is the latest sighting
  /// this tracker observed, which may be newer than the persisted value while
  /// refreshes are throttled.
  pub async fn list_open_sessions(&self, group_id: Uuid) -> Result<Vec<AttendanceSession>> {
    self.list_sessions(group_id, true).await
  }

  pub async fn list_sessions(&self, group_id: Uuid, open_only: bool) -> Result<Vec<AttendanceSession>> {
    self.require_group(group_id).await?;
    self.current_sessions(group_id, open_only).await
  }

  /// Per-subject durations for a group, computed fresh on every call. Open
  /// sessions count up to their latest observed sighting, as in
  /// [`Self::list_open_sessions`].
  pub async fn summarize(&self, group_id: Uuid) -> Result<Vec<DurationSummary>> {
    self.require_group(group_id).await?;
    let sessions = self.current_sessions(group_id, false).await?;
    Ok(summarize_sessions(&sessions))
  }

  // ── Expiry sweeper ────────────────────────────────────────────────────

  /// Close every open session in the group that has been silent for longer
  /// than the timeout. Each closes at its own last sighting, not at `now`.
  ///
  /// Returns how many sessions this call closed; a repeat returns zero.
  pub async fn sweep_expired(&self, group_id: Uuid, now: DateTime<Utc>) -> Result<usize> {
    let open = self
      .store
      .list_sessions(group_id, true)
      .await
      .map_err(Error::store)?;
    let timeout = self.config.timeout();

    let mut closed = 0;
    for session in open {
      let _slot = self.locks.lock(session.group_id, session.subject_id).await;
      let last_seen = self.freshest(&session);
      if !is_expired(last_seen, now, timeout) {
        continue;
      }
      if self
        .store
        .close_session(session.session_id, last_seen)
        .await
        .map_err(Error::store)?
      {
        closed += 1;
        self.forget(session.session_id);
        info!(session_id = %session.session_id, end_time = %last_seen, "session expired");
      }
    }

    if closed > 0 {
      info!(%group_id, closed, "swept expired sessions");
    }
    Ok(closed)
  }

  /// [`Self::sweep_expired`] over every group with open sessions. A group
  /// that fails to sweep is logged and skipped; the rest are still swept.
  pub async fn sweep_all(&self, now: DateTime<Utc>) -> Result<usize> {
    let groups = self
      .store
      .groups_with_open_sessions()
      .await
      .map_err(Error::store)?;
    let mut closed = 0;
    for group_id in groups {
      match self.sweep_expired(group_id, now).await {
        Ok(n) => closed += n,
        Err(e) => warn!(%group_id, error = %e, "group sweep failed"),
      }
    }
    Ok(closed)
  }

  // ── Leaderboards ──────────────────────────────────────────────────────

  pub async fn record_points(&self, input: NewPoints) -> Result<PointsEntry> {
    self.require_subject(input.subject_id).await?;
    self.store.record_points(input).await.map_err(Error::store)
  }

  async fn display_names(&self) -> Result<HashMap<Uuid, String>> {
    Ok(
      self
        .list_subjects()
        .await?
        .into_iter()
        .map(|s| (s.subject_id, s.display_name))
        .collect(),
    )
  }

  /// Subjects ranked by points balance.
  pub async fn points_board(&self) -> Result<Vec<LeaderboardEntry>> {
    let names = self.display_names().await?;
    let totals = self.store.points_totals().await.map_err(Error::store)?;

    let entries = totals
      .into_iter()
      .map(|t| {
        LeaderboardEntry::new(
          t.subject_id,
          display_name(&names, t.subject_id),
          t.total,
          Some(t.last_awarded_at),
        )
      })
      .collect();
    Ok(rank(entries, DEFAULT_TIE_BREAKERS))
  }

  /// Subjects ranked by attended milliseconds, summed over `group_ids`
  /// (every registered group when `None`).
  pub async fn hours_board(&self, group_ids: Option<&[Uuid]>) -> Result<Vec<LeaderboardEntry>> {
    let groups: Vec<Uuid> = match group_ids {
      Some(ids) => ids.to_vec(),
      None => self.list_groups().await?.into_iter().map(|g| g.group_id).collect(),
    };

    let mut totals: HashMap<Uuid, (i64, DateTime<Utc>)> = HashMap::new();
    for group_id in groups {
      let sessions = self.current_sessions(group_id, false).await?;
      for d in summarize_sessions(&sessions) {
        totals
          .entry(d.subject_id)
          .and_modify(|(ms, last)| {
            *ms = ms.saturating_add(d.duration_ms);
            *last = (*last).max(d.latest_end);
          })
          .or_insert((d.duration_ms, d.latest_end));
      }
    }

    let names = self.display_names().await?;
    let entries = totals
      .into_iter()
      .map(|(subject_id, (ms, last))| {
        LeaderboardEntry::new(subject_id, display_name(&names, subject_id), ms, Some(last))
      })
      .collect();
    Ok(rank(entries, DEFAULT_TIE_BREAKERS))
  }

  /// Current leaders of both boards, recomputed from scratch.
  pub async fn leaders(&self, group_ids: Option<&[Uuid]>) -> Result<Leaders> {
    let points = self.points_board().await?;
    let hours = self.hours_board(group_ids).await?;
    Ok(Leaders {
      dual_leader: dual_leader(&points, &hours),
      points:      points.into_iter().next(),
      hours:       hours.into_iter().next(),
    })
  }
}

fn display_name(names: &HashMap<Uuid, String>, subject_id: Uuid) -> String {
  names
    .get(&subject_id)
    .cloned()
    .unwrap_or_else(|| subject_id.to_string())
}
