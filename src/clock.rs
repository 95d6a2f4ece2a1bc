//! Timestamp source selection
//!
//! Every record carries a millisecond timestamp, either wall-clock time
//! since the Unix epoch or time since OS boot. The unit should be chosen
//! before the engine starts; switching mid-run is harmless but produces a
//! discontinuity in the log.

use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Unit used for every timestamp written to the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampUnit {
    /// Milliseconds since the Unix epoch
    #[default]
    EpochTime,
    /// Milliseconds since OS boot, read from /proc/uptime
    TimeSinceBoot,
}

impl TimestampUnit {
    /// Parse from a configuration string; anything unrecognized falls
    /// back to epoch time.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "boot" | "time_since_boot" | "uptime" => Self::TimeSinceBoot,
            _ => Self::EpochTime,
        }
    }
}

/// Current timestamp in milliseconds for the given unit.
pub fn timestamp_ms(unit: TimestampUnit) -> u64 {
    match unit {
        TimestampUnit::EpochTime => epoch_ms(),
        TimestampUnit::TimeSinceBoot => boot_ms(),
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// First field of /proc/uptime ("12345.67 98765.43") scaled to ms, 0 if
/// unreadable.
fn boot_ms() -> u64 {
    let Ok(uptime) = fs::read_to_string("/proc/uptime") else {
        return 0;
    };
    uptime
        .split_whitespace()
        .next()
        .and_then(|s| s.parse::<f64>().ok())
        .map(|secs| (secs * 1000.0) as u64)
        .unwrap_or(0)
}
