//! SQL schema for the attendance SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS subjects (
    subject_id   TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    created_at   TEXT NOT NULL       -- ISO 8601 UTC
);

CREATE TABLE IF NOT EXISTS attendance_groups (
    group_id   TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS beacons (
    beacon_id  TEXT PRIMARY KEY,
    beacon_key TEXT NOT NULL UNIQUE, -- canonical key, e.g. ibeacon:abc:1:2
    owner_id   TEXT NOT NULL REFERENCES subjects(subject_id),
    label      TEXT,
    created_at TEXT NOT NULL
);

-- Session times are epoch milliseconds so they compare numerically.
CREATE TABLE IF NOT EXISTS sessions (
    session_id   TEXT PRIMARY KEY,
    group_id     TEXT NOT NULL REFERENCES attendance_groups(group_id),
    subject_id   TEXT NOT NULL REFERENCES subjects(subject_id),
    start_ms     INTEGER NOT NULL,
    last_seen_ms INTEGER NOT NULL,
    end_ms       INTEGER,            -- NULL while open
    scanner_id   TEXT NOT NULL,
    CHECK (start_ms <= last_seen_ms),
    CHECK (end_ms IS NULL OR end_ms = last_seen_ms)
);

-- At most one open session per (group, subject).
CREATE UNIQUE INDEX IF NOT EXISTS sessions_open_slot_idx
    ON sessions(group_id, subject_id) WHERE end_ms IS NULL;
CREATE INDEX IF NOT EXISTS sessions_group_end_idx   ON sessions(group_id, end_ms);
CREATE INDEX IF NOT EXISTS sessions_subject_end_idx ON sessions(subject_id, end_ms);

-- Append-only points ledger.
CREATE TABLE IF NOT EXISTS points (
    entry_id   TEXT PRIMARY KEY,
    subject_id TEXT NOT NULL REFERENCES subjects(subject_id),
    amount     INTEGER NOT NULL,
    reason     TEXT,
    awarded_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS points_subject_idx ON points(subject_id);

PRAGMA user_version = 1;
";
