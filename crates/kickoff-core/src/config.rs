//! Engine configuration.
//!
//! Configuration is stored at `~/.config/kickoff/config.json`. Every field
//! has a default, so a missing or partial file is fine.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{FixedOffset, Local, Offset};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::FreshnessPolicy;
use crate::live::ExponentialBackoff;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "kickoff";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const ENV_DATA_DIR: &str = "KICKOFF_DATA_DIR";
const ENV_UTC_OFFSET: &str = "KICKOFF_UTC_OFFSET_MINUTES";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// TTL for dates before today. Late corrections (VAR, admin fixes) must
    /// still surface eventually.
    pub past_ttl_minutes: i64,
    /// TTL for today and for any date holding an in-progress fixture.
    pub present_ttl_minutes: i64,
    /// TTL for dates after today (lineups and postponements change).
    pub future_ttl_minutes: i64,
    pub refresh_interval_secs: u64,
    pub fetch_timeout_secs: u64,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    /// None retries forever.
    pub reconnect_max_attempts: Option<usize>,
    /// Offset used to decide which calendar day is "today". Falls back to
    /// the machine's local offset.
    pub utc_offset_minutes: Option<i32>,
    /// League ids passed to the provider; None means all leagues.
    pub leagues: Option<Vec<i64>>,
    /// Directory holding `YYYY-MM-DD.json` fixture files for the CLI driver.
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            past_ttl_minutes: 6 * 60,
            present_ttl_minutes: 15,
            future_ttl_minutes: 15,
            refresh_interval_secs: 180,
            fetch_timeout_secs: 30,
            reconnect_initial_ms: 1000,
            reconnect_max_ms: 60_000,
            reconnect_max_attempts: Some(8),
            utc_offset_minutes: None,
            leagues: None,
            data_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Ok(serde_json::from_str(&contents).context("Failed to parse config file")?)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply `KICKOFF_DATA_DIR` and `KICKOFF_UTC_OFFSET_MINUTES` on top of
    /// the file values.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var(ENV_DATA_DIR).ok(),
            std::env::var(ENV_UTC_OFFSET).ok(),
        )
    }

    fn with_overrides(mut self, data_dir: Option<String>, utc_offset: Option<String>) -> Self {
        if let Some(dir) = data_dir.filter(|d| !d.trim().is_empty()) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = utc_offset {
            match raw.trim().parse::<i32>() {
                Ok(minutes) => self.utc_offset_minutes = Some(minutes),
                Err(e) => warn!(value = %raw, error = %e, "Ignoring invalid {}", ENV_UTC_OFFSET),
            }
        }
        self
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Configured offset, or the local one when unset or out of range
    /// (more than a day either way).
    pub fn utc_offset(&self) -> FixedOffset {
        let configured = self
            .utc_offset_minutes
            .and_then(|m| m.checked_mul(60))
            .and_then(FixedOffset::east_opt);
        if configured.is_none() {
            if let Some(minutes) = self.utc_offset_minutes {
                warn!(minutes, "UTC offset out of range, using local offset");
            }
        }
        configured.unwrap_or_else(|| Local::now().offset().fix())
    }

    pub fn freshness_policy(&self) -> FreshnessPolicy {
        FreshnessPolicy::new(self.utc_offset())
            .with_past_ttl(chrono::Duration::minutes(self.past_ttl_minutes))
            .with_present_ttl(chrono::Duration::minutes(self.present_ttl_minutes))
            .with_future_ttl(chrono::Duration::minutes(self.future_ttl_minutes))
    }

    pub fn reconnect_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(self.reconnect_initial_ms),
            Duration::from_millis(self.reconnect_max_ms),
            self.reconnect_max_attempts,
        )
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }
}
