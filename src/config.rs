//! Stream configuration
//!
//! Everything the caller can choose for a stream, loaded once at open time.
//! Stored as JSON; missing fields take their defaults.

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::format::AudioSpec;

/// Default sleep between cursor polls
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

/// Default bound on sleeps in a single polling wait (5 seconds at 10ms)
pub const DEFAULT_MAX_POLL_ITERATIONS: u32 = 500;

/// Default bound on status polls while waiting for a stop to take effect
pub const DEFAULT_MAX_STOP_POLLS: u32 = 100_000;

/// How the playback driver waits for the cursor to leave the current chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitStrategy {
    /// Sleep and re-read the play cursor
    #[default]
    Polling,
    /// Block on position notifications armed at every chunk boundary
    Event,
}

impl fmt::Display for WaitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitStrategy::Polling => write!(f, "polling"),
            WaitStrategy::Event => write!(f, "event"),
        }
    }
}

/// Engine tuning applied when a stream is opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineOptions {
    /// Try a hardware primary buffer before falling back to a secondary one
    pub prefer_primary: bool,
    pub wait_strategy: WaitStrategy,
    pub poll_interval_ms: u64,
    /// `None` polls until the cursor moves
    pub max_poll_iterations: Option<u32>,
    /// `None` waits for a notification indefinitely
    pub event_timeout_ms: Option<u64>,
    pub max_stop_polls: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            prefer_primary: true,
            wait_strategy: WaitStrategy::Polling,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_poll_iterations: Some(DEFAULT_MAX_POLL_ITERATIONS),
            event_timeout_ms: None,
            max_stop_polls: DEFAULT_MAX_STOP_POLLS,
        }
    }
}

impl EngineOptions {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn event_timeout(&self) -> Option<Duration> {
        self.event_timeout_ms.map(Duration::from_millis)
    }
}

/// Requested audio parameters plus engine options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct StreamConfig {
    pub audio: AudioSpec,
    pub engine: EngineOptions,
}

impl StreamConfig {
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading stream config: {}", path.display());
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
