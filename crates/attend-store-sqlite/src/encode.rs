//! Encoding and decoding helpers between domain types and the plain values
//! stored in SQLite columns.
//!
//! Creation timestamps are stored as RFC 3339 strings. Session and points
//! times are stored as epoch milliseconds. UUIDs are stored as hyphenated
//! lowercase strings.

use attend_core::{
  beacon::{Beacon, BeaconKey},
  points::PointsTotal,
  session::AttendanceSession,
  subject::{Group, Subject},
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_ms(dt: DateTime<Utc>) -> i64 { dt.timestamp_millis() }

pub fn decode_ms(ms: i64) -> Result<DateTime<Utc>> {
  DateTime::from_timestamp_millis(ms)
    .ok_or_else(|| Error::DateParse(format!("timestamp out of range: {ms}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `subjects` row.
pub struct RawSubject {
  pub subject_id:   String,
  pub display_name: String,
  pub created_at:   String,
}

impl RawSubject {
  pub const COLUMNS: &'static str = "subject_id, display_name, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      subject_id:   row.get(0)?,
      display_name: row.get(1)?,
      created_at:   row.get(2)?,
    })
  }

  pub fn into_subject(self) -> Result<Subject> {
    Ok(Subject {
      subject_id:   decode_uuid(&self.subject_id)?,
      display_name: self.display_name,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `groups` row.
pub struct RawGroup {
  pub group_id:   String,
  pub name:       String,
  pub created_at: String,
}

impl RawGroup {
  pub const COLUMNS: &'static str = "group_id, name, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      group_id:   row.get(0)?,
      name:       row.get(1)?,
      created_at: row.get(2)?,
    })
  }

  pub fn into_group(self) -> Result<Group> {
    Ok(Group {
      group_id:   decode_uuid(&self.group_id)?,
      name:       self.name,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `beacons` row.
pub struct RawBeacon {
  pub beacon_id:  String,
  pub beacon_key: String,
  pub owner_id:   String,
  pub label:      Option<String>,
  pub created_at: String,
}

impl RawBeacon {
  pub const COLUMNS: &'static str = "beacon_id, beacon_key, owner_id, label, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      beacon_id:  row.get(0)?,
      beacon_key: row.get(1)?,
      owner_id:   row.get(2)?,
      label:      row.get(3)?,
      created_at: row.get(4)?,
    })
  }

  pub fn into_beacon(self) -> Result<Beacon> {
    Ok(Beacon {
      beacon_id:  decode_uuid(&self.beacon_id)?,
      key:        BeaconKey::from_stored(self.beacon_key),
      owner_id:   decode_uuid(&self.owner_id)?,
      label:      self.label,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `sessions` row.
pub struct RawSession {
  pub session_id:   String,
  pub group_id:     String,
  pub subject_id:   String,
  pub start_ms:     i64,
  pub last_seen_ms: i64,
  pub end_ms:       Option<i64>,
  pub scanner_id:   String,
}

impl RawSession {
  pub const COLUMNS: &'static str =
    "session_id, group_id, subject_id, start_ms, last_seen_ms, end_ms, scanner_id";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      session_id:   row.get(0)?,
      group_id:     row.get(1)?,
      subject_id:   row.get(2)?,
      start_ms:     row.get(3)?,
      last_seen_ms: row.get(4)?,
      end_ms:       row.get(5)?,
      scanner_id:   row.get(6)?,
    })
  }

  pub fn into_session(self) -> Result<AttendanceSession> {
    Ok(AttendanceSession {
      session_id:   decode_uuid(&self.session_id)?,
      group_id:     decode_uuid(&self.group_id)?,
      subject_id:   decode_uuid(&self.subject_id)?,
      start_time:   decode_ms(self.start_ms)?,
      last_seen_at: decode_ms(self.last_seen_ms)?,
      end_time:     self.end_ms.map(decode_ms).transpose()?,
      scanner_id:   self.scanner_id,
    })
  }
}

/// One aggregated row of the points ledger.
pub struct RawPointsTotal {
  pub subject_id: String,
  pub total:      i64,
  pub last_ms:    i64,
}

impl RawPointsTotal {
  pub fn into_total(self) -> Result<PointsTotal> {
    Ok(PointsTotal {
      subject_id:      decode_uuid(&self.subject_id)?,
      total:           self.total,
      last_awarded_at: decode_ms(self.last_ms)?,
    })
  }
}
