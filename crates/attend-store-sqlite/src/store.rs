//! [`SqliteStore`]: the SQLite implementation of [`AttendanceStore`].

use std::path::Path;

use attend_core::{
  beacon::{Beacon, BeaconKey, NewBeacon},
  points::{NewPoints, PointsEntry, PointsTotal},
  session::{AttendanceSession, NewSession},
  store::AttendanceStore,
  subject::{Group, Subject},
};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    RawBeacon, RawGroup, RawPointsTotal, RawSession, RawSubject, decode_uuid, encode_dt,
    encode_ms, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An attendance store backed by a single SQLite file.
///
/// Clones share one underlying connection.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a `sessions` query and decode every row.
  async fn query_sessions(&self, sql: String, params: Vec<String>) -> Result<Vec<AttendanceSession>> {
    let raws: Vec<RawSession> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawSession::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSession::into_session).collect()
  }

  /// Run a `beacons` query and decode every row.
  async fn query_beacons(&self, sql: String, params: Vec<String>) -> Result<Vec<Beacon>> {
    let raws: Vec<RawBeacon> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawBeacon::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawBeacon::into_beacon).collect()
  }

  /// Execute a write and return the number of changed rows.
  async fn execute(&self, sql: &'static str, params: Vec<rusqlite::types::Value>) -> Result<usize> {
    Ok(
      self
        .conn
        .call(move |conn| Ok(conn.execute(sql, rusqlite::params_from_iter(params))?))
        .await?,
    )
  }
}

fn text(s: impl Into<String>) -> rusqlite::types::Value { rusqlite::types::Value::Text(s.into()) }

fn int(i: i64) -> rusqlite::types::Value { rusqlite::types::Value::Integer(i) }

fn opt_text(s: Option<String>) -> rusqlite::types::Value {
  s.map_or(rusqlite::types::Value::Null, rusqlite::types::Value::Text)
}

// ─── AttendanceStore impl ────────────────────────────────────────────────────

impl AttendanceStore for SqliteStore {
  type Error = Error;

  // ── Subjects & groups ─────────────────────────────────────────────────────

  async fn put_subject(&self, subject_id: Uuid, display_name: String) -> Result<Subject> {
    self
      .execute(
        "INSERT INTO subjects (subject_id, display_name, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT (subject_id) DO UPDATE SET display_name = excluded.display_name",
        vec![text(encode_uuid(subject_id)), text(display_name), text(encode_dt(Utc::now()))],
      )
      .await?;

    self
      .get_subject(subject_id)
      .await?
      .ok_or(Error::Vanished(subject_id))
  }

  async fn get_subject(&self, subject_id: Uuid) -> Result<Option<Subject>> {
    let id_str = encode_uuid(subject_id);

    let raw: Option<RawSubject> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {} FROM subjects WHERE subject_id = ?1", RawSubject::COLUMNS),
              rusqlite::params![id_str],
              RawSubject::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSubject::into_subject).transpose()
  }

  async fn list_subjects(&self) -> Result<Vec<Subject>> {
    let raws: Vec<RawSubject> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM subjects ORDER BY display_name COLLATE NOCASE, subject_id",
          RawSubject::COLUMNS
        ))?;
        let rows = stmt
          .query_map([], RawSubject::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSubject::into_subject).collect()
  }

  async fn put_group(&self, group_id: Uuid, name: String) -> Result<Group> {
    self
      .execute(
        "INSERT INTO attendance_groups (group_id, name, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT (group_id) DO UPDATE SET name = excluded.name",
        vec![text(encode_uuid(group_id)), text(name), text(encode_dt(Utc::now()))],
      )
      .await?;

    self.get_group(group_id).await?.ok_or(Error::Vanished(group_id))
  }

  async fn get_group(&self, group_id: Uuid) -> Result<Option<Group>> {
    let id_str = encode_uuid(group_id);

    let raw: Option<RawGroup> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {} FROM attendance_groups WHERE group_id = ?1", RawGroup::COLUMNS),
              rusqlite::params![id_str],
              RawGroup::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawGroup::into_group).transpose()
  }

  async fn list_groups(&self) -> Result<Vec<Group>> {
    let raws: Vec<RawGroup> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM attendance_groups ORDER BY created_at, group_id",
          RawGroup::COLUMNS
        ))?;
        let rows = stmt
          .query_map([], RawGroup::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawGroup::into_group).collect()
  }

  async fn groups_with_open_sessions(&self) -> Result<Vec<Uuid>> {
    let ids: Vec<String> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT DISTINCT group_id FROM sessions WHERE end_ms IS NULL")?;
        let rows = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    ids.iter().map(|s| decode_uuid(s)).collect()
  }

  // ── Beacons ───────────────────────────────────────────────────────────────

  async fn get_beacon(&self, beacon_id: Uuid) -> Result<Option<Beacon>> {
    let sql = format!("SELECT {} FROM beacons WHERE beacon_id = ?1", RawBeacon::COLUMNS);
    Ok(self.query_beacons(sql, vec![encode_uuid(beacon_id)]).await?.pop())
  }

  async fn find_beacon_by_key(&self, key: BeaconKey) -> Result<Option<Beacon>> {
    let sql = format!("SELECT {} FROM beacons WHERE beacon_key = ?1", RawBeacon::COLUMNS);
    Ok(self.query_beacons(sql, vec![key.as_str().to_owned()]).await?.pop())
  }

  async fn list_beacons(&self, owner_id: Option<Uuid>) -> Result<Vec<Beacon>> {
    match owner_id {
      Some(owner) => {
        let sql = format!(
          "SELECT {} FROM beacons WHERE owner_id = ?1 ORDER BY beacon_key",
          RawBeacon::COLUMNS
        );
        self.query_beacons(sql, vec![encode_uuid(owner)]).await
      }
      None => {
        let sql = format!("SELECT {} FROM beacons ORDER BY beacon_key", RawBeacon::COLUMNS);
        self.query_beacons(sql, vec![]).await
      }
    }
  }

  async fn insert_beacon(&self, input: NewBeacon) -> Result<Option<Beacon>> {
    let beacon = Beacon {
      beacon_id:  Uuid::new_v4(),
      key:        input.key,
      owner_id:   input.owner_id,
      label:      input.label,
      created_at: Utc::now(),
    };

    let changed = self
      .execute(
        "INSERT INTO beacons (beacon_id, beacon_key, owner_id, label, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (beacon_key) DO NOTHING",
        vec![
          text(encode_uuid(beacon.beacon_id)),
          text(beacon.key.as_str()),
          text(encode_uuid(beacon.owner_id)),
          opt_text(beacon.label.clone()),
          text(encode_dt(beacon.created_at)),
        ],
      )
      .await?;

    Ok((changed > 0).then_some(beacon))
  }

  async fn update_beacon(
    &self,
    beacon_id:      Uuid,
    expected_owner: Uuid,
    owner_id:       Uuid,
    label:          Option<String>,
  ) -> Result<Option<Beacon>> {
    let changed = self
      .execute(
        "UPDATE beacons SET owner_id = ?3, label = ?4
         WHERE beacon_id = ?1 AND owner_id = ?2",
        vec![
          text(encode_uuid(beacon_id)),
          text(encode_uuid(expected_owner)),
          text(encode_uuid(owner_id)),
          opt_text(label),
        ],
      )
      .await?;

    if changed == 0 {
      return Ok(None);
    }
    self.get_beacon(beacon_id).await
  }

  async fn delete_beacon(&self, beacon_id: Uuid) -> Result<bool> {
    let changed = self
      .execute(
        "DELETE FROM beacons WHERE beacon_id = ?1",
        vec![text(encode_uuid(beacon_id))],
      )
      .await?;
    Ok(changed > 0)
  }

  // ── Sessions ──────────────────────────────────────────────────────────────

  async fn get_session(&self, session_id: Uuid) -> Result<Option<AttendanceSession>> {
    let sql = format!("SELECT {} FROM sessions WHERE session_id = ?1", RawSession::COLUMNS);
    Ok(self.query_sessions(sql, vec![encode_uuid(session_id)]).await?.pop())
  }

  async fn find_open_session(
    &self,
    group_id:   Uuid,
    subject_id: Uuid,
  ) -> Result<Option<AttendanceSession>> {
    let sql = format!(
      "SELECT {} FROM sessions
       WHERE group_id = ?1 AND subject_id = ?2 AND end_ms IS NULL",
      RawSession::COLUMNS
    );
    Ok(
      self
        .query_sessions(sql, vec![encode_uuid(group_id), encode_uuid(subject_id)])
        .await?
        .pop(),
    )
  }

  async fn insert_open_session(&self, input: NewSession) -> Result<Option<AttendanceSession>> {
    let session = AttendanceSession {
      session_id:   Uuid::new_v4(),
      group_id:     input.group_id,
      subject_id:   input.subject_id,
      start_time:   input.observed_at,
      last_seen_at: input.observed_at,
      end_time:     None,
      scanner_id:   input.scanner_id,
    };

    // Collides with `sessions_open_slot_idx` when the slot is already open.
    let changed = self
      .execute(
        "INSERT INTO sessions
           (session_id, group_id, subject_id, start_ms, last_seen_ms, end_ms, scanner_id)
         VALUES (?1, ?2, ?3, ?4, ?4, NULL, ?5)
         ON CONFLICT DO NOTHING",
        vec![
          text(encode_uuid(session.session_id)),
          text(encode_uuid(session.group_id)),
          text(encode_uuid(session.subject_id)),
          int(encode_ms(session.start_time)),
          text(session.scanner_id.clone()),
        ],
      )
      .await?;

    Ok((changed > 0).then_some(session))
  }

  async fn refresh_session(&self, session_id: Uuid, last_seen: DateTime<Utc>) -> Result<bool> {
    let changed = self
      .execute(
        "UPDATE sessions SET last_seen_ms = MAX(last_seen_ms, ?2)
         WHERE session_id = ?1 AND end_ms IS NULL",
        vec![text(encode_uuid(session_id)), int(encode_ms(last_seen))],
      )
      .await?;
    Ok(changed > 0)
  }

  async fn close_session(&self, session_id: Uuid, last_seen: DateTime<Utc>) -> Result<bool> {
    let changed = self
      .execute(
        "UPDATE sessions SET last_seen_ms = ?2, end_ms = ?2
         WHERE session_id = ?1 AND end_ms IS NULL AND last_seen_ms <= ?2",
        vec![text(encode_uuid(session_id)), int(encode_ms(last_seen))],
      )
      .await?;
    Ok(changed > 0)
  }

  async fn list_sessions(&self, group_id: Uuid, open_only: bool) -> Result<Vec<AttendanceSession>> {
    let open_filter = if open_only { "AND end_ms IS NULL" } else { "" };
    let sql = format!(
      "SELECT {} FROM sessions
       WHERE group_id = ?1 {open_filter}
       ORDER BY start_ms, session_id",
      RawSession::COLUMNS
    );
    self.query_sessions(sql, vec![encode_uuid(group_id)]).await
  }

  async fn subject_has_open_session(&self, subject_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(subject_id);

    let open: bool = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT EXISTS (SELECT 1 FROM sessions WHERE subject_id = ?1 AND end_ms IS NULL)",
          rusqlite::params![id_str],
          |row| row.get(0),
        )?)
      })
      .await?;
    Ok(open)
  }

  // ── Points ledger ─────────────────────────────────────────────────────────

  async fn record_points(&self, input: NewPoints) -> Result<PointsEntry> {
    let entry = PointsEntry {
      entry_id:   Uuid::new_v4(),
      subject_id: input.subject_id,
      amount:     input.amount,
      reason:     input.reason,
      awarded_at: input.awarded_at,
    };

    self
      .execute(
        "INSERT INTO points (entry_id, subject_id, amount, reason, awarded_ms)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        vec![
          text(encode_uuid(entry.entry_id)),
          text(encode_uuid(entry.subject_id)),
          int(entry.amount),
          opt_text(entry.reason.clone()),
          int(encode_ms(entry.awarded_at)),
        ],
      )
      .await?;

    Ok(entry)
  }

  async fn points_totals(&self) -> Result<Vec<PointsTotal>> {
    let raws: Vec<RawPointsTotal> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT subject_id, SUM(amount), MAX(awarded_ms)
           FROM points
           GROUP BY subject_id",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawPointsTotal {
              subject_id: row.get(0)?,
              total:      row.get(1)?,
              last_ms:    row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPointsTotal::into_total).collect()
  }
}
