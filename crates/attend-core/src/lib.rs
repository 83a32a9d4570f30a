//! Core types, algorithms and trait definitions for attendance tracking.
//!
//! Sightings from proximity scanners are reconciled into attendance sessions
//! per (group, subject). Durations and leaderboards are derived from those
//! sessions on read. This crate has no HTTP or database dependencies; storage
//! backends implement [`store::AttendanceStore`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod beacon;
pub mod config;
pub mod duration;
pub mod error;
pub mod leaderboard;
mod locks;
pub mod points;
pub mod session;
pub mod store;
pub mod subject;
pub mod tracker;

pub use config::TrackingConfig;
pub use error::{Error, Result};
pub use tracker::{Observation, Sighting, Tracker};
