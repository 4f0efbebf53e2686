//! Runtime configuration.
//!
//! Values come from the environment; anything unset falls back to the
//! defaults in [`PileupConfig::default`].

use std::{path::PathBuf, time::Duration};

use crate::error::{PileupError, PileupResult};

/// Where queue, status and QSO documents live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageTarget {
    /// Process-local maps; nothing survives a restart.
    Memory,
    /// SQLite without a backing file.
    SqliteMemory,
    /// SQLite database file.
    Sqlite(PathBuf),
}

/// Complete pileup configuration.
#[derive(Debug, Clone)]
pub struct PileupConfig {
    /// Maximum number of queued callsigns.
    pub max_queue_size: usize,
    /// Backing store.
    pub storage: StorageTarget,
    /// Upper bound on any single store call.
    pub store_timeout: Duration,
    /// Per-listener event buffer.
    pub listener_buffer: usize,
    /// Consecutive overflows tolerated before a listener is dropped.
    pub listener_max_strikes: u32,
    /// Idle interval after which stream adapters should emit a keepalive.
    pub keepalive_interval: Duration,
}

impl Default for PileupConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 4,
            storage: StorageTarget::Memory,
            store_timeout: Duration::from_secs(5),
            listener_buffer: 64,
            listener_max_strikes: 3,
            keepalive_interval: Duration::from_secs(30),
        }
    }
}

impl PileupConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional variables:
    /// - `MAX_QUEUE_SIZE` -- queue capacity (default 4, must be at least 1)
    /// - `PILEUP_DB_PATH` -- SQLite file; `:memory:` for in-memory SQLite;
    ///   unset for the in-memory map store
    /// - `STORE_TIMEOUT_MS` -- per store call timeout (default 5000)
    /// - `EVENT_BUFFER` -- per-listener event buffer (default 64)
    /// - `EVENT_MAX_STRIKES` -- overflows before a listener is dropped (default 3)
    /// - `KEEPALIVE_SECS` -- stream keepalive interval (default 30)
    pub fn from_env() -> PileupResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`PileupConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> PileupResult<Self> {
        let defaults = Self::default();

        let max_queue_size: usize = parse_or(&lookup, "MAX_QUEUE_SIZE", defaults.max_queue_size)?;
        if max_queue_size == 0 {
            return Err(PileupError::Config(
                "invalid MAX_QUEUE_SIZE: must be at least 1".to_string(),
            ));
        }

        let storage = match lookup("PILEUP_DB_PATH").map(|v| v.trim().to_string()) {
            None => StorageTarget::Memory,
            Some(path) if path.is_empty() => StorageTarget::Memory,
            Some(path) if path == ":memory:" => StorageTarget::SqliteMemory,
            Some(path) => StorageTarget::Sqlite(PathBuf::from(path)),
        };

        let store_timeout_ms: u64 = parse_or(
            &lookup,
            "STORE_TIMEOUT_MS",
            defaults.store_timeout.as_millis() as u64,
        )?;
        let listener_buffer: usize = parse_or(&lookup, "EVENT_BUFFER", defaults.listener_buffer)?;
        if listener_buffer == 0 {
            return Err(PileupError::Config(
                "invalid EVENT_BUFFER: must be at least 1".to_string(),
            ));
        }
        let listener_max_strikes: u32 =
            parse_or(&lookup, "EVENT_MAX_STRIKES", defaults.listener_max_strikes)?;
        let keepalive_secs: u64 = parse_or(
            &lookup,
            "KEEPALIVE_SECS",
            defaults.keepalive_interval.as_secs(),
        )?;

        Ok(Self {
            max_queue_size,
            storage,
            store_timeout: Duration::from_millis(store_timeout_ms),
            listener_buffer,
            listener_max_strikes,
            keepalive_interval: Duration::from_secs(keepalive_secs),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> PileupResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| PileupError::Config(format!("invalid {key}: {e}"))),
    }
}
