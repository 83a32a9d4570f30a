//! Tuning knobs for the reconciler and the expiry sweeper.

use chrono::TimeDelta;
use serde::Deserialize;

/// Timing configuration, deserialised from the `[tracking]` table of the
/// server config. All values are milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
  /// Minimum interval between persisted `last_seen_at` updates of one open
  /// session.
  pub throttle_ms:       u64,
  /// Silence after which an open session is considered expired.
  pub timeout_ms:        u64,
  /// How often the server's background sweeper runs.
  pub sweep_interval_ms: u64,
}

impl Default for TrackingConfig {
  fn default() -> Self {
    Self {
      throttle_ms:       60_000,
      timeout_ms:        300_000,
      sweep_interval_ms: 60_000,
    }
  }
}

impl TrackingConfig {
  pub fn throttle(&self) -> TimeDelta { millis(self.throttle_ms) }

  pub fn timeout(&self) -> TimeDelta { millis(self.timeout_ms) }

  pub fn sweep_interval(&self) -> std::time::Duration {
    std::time::Duration::from_millis(self.sweep_interval_ms)
  }
}

fn millis(ms: u64) -> TimeDelta {
  i64::try_from(ms)
    .ok()
    .and_then(TimeDelta::try_milliseconds)
    .unwrap_or(TimeDelta::MAX)
}
