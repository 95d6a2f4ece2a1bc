//! Engine configuration
//!
//! Callers can build a `ProfileConfig` directly, load it from a JSON
//! file, or load it from `PERFMON_*` environment variables. The sample
//! binary uses the environment form; embedding applications usually fill
//! the struct themselves.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::clock::TimestampUnit;
use crate::error::ProfileError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Event log path
    pub log_path: PathBuf,

    /// Total on-disk byte cap across the rotating files; 0 disables
    /// rotation and lets a single file grow unbounded
    pub max_cap_bytes: u64,

    /// Timestamp unit stamped on every record
    pub timestamp_unit: TimestampUnit,

    /// Sampling period for the memory monitors, in ms
    pub memory_period_ms: u64,

    /// Sampling period for the CPU monitor, in ms
    pub cpu_period_ms: u64,

    /// Sampling period for the GPU monitors, in ms
    pub gpu_period_ms: u64,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        ProfileConfig {
            log_path: PathBuf::from("./perfmon.log"),
            max_cap_bytes: 0,
            timestamp_unit: TimestampUnit::EpochTime,
            memory_period_ms: 200,
            cpu_period_ms: 200,
            gpu_period_ms: 200,
        }
    }
}

impl ProfileConfig {
    /// Load from the environment: `PERFMON_LOG`, `PERFMON_CAP_BYTES`,
    /// `PERFMON_TIMESTAMP_UNIT` ("epoch" or "boot"),
    /// `PERFMON_MEMORY_PERIOD_MS`, `PERFMON_CPU_PERIOD_MS`,
    /// `PERFMON_GPU_PERIOD_MS`. Unset or unparsable variables keep
    /// their defaults.
    pub fn from_env() -> Self {
        let mut config = ProfileConfig::default();
        if let Ok(path) = env::var("PERFMON_LOG") {
            config.log_path = PathBuf::from(path);
        }
        if let Some(cap) = env_u64("PERFMON_CAP_BYTES") {
            config.max_cap_bytes = cap;
        }
        if let Ok(unit) = env::var("PERFMON_TIMESTAMP_UNIT") {
            config.timestamp_unit = TimestampUnit::parse(&unit);
        }
        if let Some(period) = env_u64("PERFMON_MEMORY_PERIOD_MS") {
            config.memory_period_ms = period;
        }
        if let Some(period) = env_u64("PERFMON_CPU_PERIOD_MS") {
            config.cpu_period_ms = period;
        }
        if let Some(period) = env_u64("PERFMON_GPU_PERIOD_MS") {
            config.gpu_period_ms = period;
        }
        config
    }

    /// Load from a JSON file; missing fields fall back to defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| ProfileError::Config(e.to_string()))
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok()?.parse().ok()
}
