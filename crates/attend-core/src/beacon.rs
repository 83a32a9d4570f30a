//! Beacons and the identity registry rules.
//!
//! A beacon is a physical proximity tag. Scanners report its vendor fields in
//! whatever shape their SDK produces; [`canonicalize`] folds those into one
//! stable [`BeaconKey`], which maps to exactly one owning subject.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, subject::Actor};

// ─── Keys ────────────────────────────────────────────────────────────────────

/// The identifying fields an iBeacon-style advertisement carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorFields {
  pub proximity_uuid: String,
  pub major:          u16,
  pub minor:          u16,
}

/// Canonical, globally unique beacon key, e.g. `ibeacon:abc:1:2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BeaconKey(String);

const KEY_PREFIX: &str = "ibeacon";

/// Fold vendor fields into a [`BeaconKey`].
///
/// Case and whitespace in the proximity UUID are normalised; the numeric
/// sub-identifiers are rendered in plain decimal.
pub fn canonicalize(fields: &VendorFields) -> BeaconKey {
  let uuid: String = fields
    .proximity_uuid
    .chars()
    .filter(|c| !c.is_whitespace())
    .flat_map(char::to_lowercase)
    .collect();
  BeaconKey(format!("{KEY_PREFIX}:{uuid}:{}:{}", fields.major, fields.minor))
}

impl VendorFields {
  /// Parse a raw scanner identifier such as `abc/1/2`, `ABC:0001:2` or an
  /// already-canonical `ibeacon:abc:1:2`.
  ///
  /// Returns `None` for anything that does not carry a UUID and two 16-bit
  /// sub-identifiers.
  pub fn parse(raw: &str) -> Option<Self> {
    let mut parts: Vec<&str> = raw
      .trim()
      .split(['/', ':', ','])
      .map(str::trim)
      .collect();

    if parts.len() == 4 && parts[0].eq_ignore_ascii_case(KEY_PREFIX) {
      parts.remove(0);
    }

    let [uuid, major, minor] = parts.as_slice() else {
      return None;
    };
    if uuid.is_empty() {
      return None;
    }

    Some(Self {
      proximity_uuid: (*uuid).to_owned(),
      major:          major.parse().ok()?,
      minor:          minor.parse().ok()?,
    })
  }
}

impl BeaconKey {
  /// Parse and canonicalise a raw scanner identifier.
  pub fn from_raw(raw: &str) -> Option<Self> {
    VendorFields::parse(raw).as_ref().map(canonicalize)
  }

  pub fn as_str(&self) -> &str { &self.0 }

  /// Wrap a key read back from storage. The caller vouches that it was
  /// produced by [`canonicalize`].
  pub fn from_stored(s: String) -> Self { Self(s) }
}

impl fmt::Display for BeaconKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// A paired beacon. The registry owns these records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beacon {
  pub beacon_id:  Uuid,
  pub key:        BeaconKey,
  pub owner_id:   Uuid,
  pub label:      Option<String>,
  pub created_at: DateTime<Utc>,
}

/// Input to [`crate::store::AttendanceStore::insert_beacon`].
#[derive(Debug, Clone)]
pub struct NewBeacon {
  pub key:      BeaconKey,
  pub owner_id: Uuid,
  pub label:    Option<String>,
}

/// A request to pair `key` with `owner_id`.
#[derive(Debug, Clone)]
pub struct PairRequest {
  pub key:      BeaconKey,
  pub owner_id: Uuid,
  pub label:    Option<String>,
}

// ─── Pairing rules ───────────────────────────────────────────────────────────

/// What a pairing request resolves to once the current record is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingDecision {
  /// No beacon with this key exists yet.
  Create,
  /// Already owned by the requested owner; only the label may change.
  Relabel(Beacon),
  /// Owned by someone else, and the actor may take it over.
  Reassign(Beacon),
}

/// Decide how to apply `request` on top of `existing`.
///
/// `current_owner_active` reports whether the existing owner currently has an
/// open session anywhere; it is only consulted for elevated reassignment.
pub fn decide_pairing(
  existing: Option<Beacon>,
  request: &PairRequest,
  actor: &Actor,
  current_owner_active: bool,
) -> Result<PairingDecision> {
  if !actor.elevated && actor.subject_id != request.owner_id {
    return Err(Error::Forbidden(
      "only elevated callers may pair beacons for other subjects".into(),
    ));
  }

  let Some(beacon) = existing else {
    return Ok(PairingDecision::Create);
  };

  if beacon.owner_id == request.owner_id {
    return Ok(PairingDecision::Relabel(beacon));
  }

  if actor.elevated && !current_owner_active {
    return Ok(PairingDecision::Reassign(beacon));
  }

  Err(Error::BeaconConflict {
    key:      beacon.key.to_string(),
    owner_id: beacon.owner_id,
  })
}
