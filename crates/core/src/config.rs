//! Runtime configuration for the offline sync core.

use std::time::Duration;

use log::warn;

use crate::sync::{DEFAULT_RETRY_BUDGET, DEFAULT_SYNC_INTERVAL_SECS};

const RETRY_BUDGET_ENV: &str = "LEDGERLINE_RETRY_BUDGET";
const SYNC_INTERVAL_ENV: &str = "LEDGERLINE_SYNC_INTERVAL_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Failed attempts tolerated before an operation is quarantined.
    pub retry_budget: u32,
    /// Cadence of the periodic sync timer.
    pub sync_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry_budget: DEFAULT_RETRY_BUDGET,
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
        }
    }
}

impl SyncConfig {
    /// Reads overrides from the environment, falling back to defaults for
    /// unset or unparsable values.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let retry_budget = read_env_number(RETRY_BUDGET_ENV)
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(defaults.retry_budget);
        let sync_interval = read_env_number(SYNC_INTERVAL_ENV)
            .filter(|v| *v > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.sync_interval);

        Self {
            retry_budget,
            sync_interval,
        }
    }

    pub fn with_retry_budget(mut self, retry_budget: u32) -> Self {
        self.retry_budget = retry_budget.max(1);
        self
    }

    pub fn with_sync_interval(mut self, sync_interval: Duration) -> Self {
        self.sync_interval = sync_interval;
        self
    }
}

fn read_env_number(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<u64>() {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("[Config] Ignoring {}='{}': {}", name, trimmed, err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_sync_policy() {
        let config = SyncConfig::default();
        assert_eq!(config.retry_budget, 3);
        assert_eq!(config.sync_interval, Duration::from_secs(30));
    }

    #[test]
    fn env_overrides_and_rejects_garbage() {
        std::env::set_var(RETRY_BUDGET_ENV, "5");
        std::env::set_var(SYNC_INTERVAL_ENV, "not-a-number");
        let config = SyncConfig::from_env();
        std::env::remove_var(RETRY_BUDGET_ENV);
        std::env::remove_var(SYNC_INTERVAL_ENV);

        assert_eq!(config.retry_budget, 5);
        assert_eq!(config.sync_interval, Duration::from_secs(30));
    }

    #[test]
    fn builder_never_allows_zero_budget() {
        let config = SyncConfig::default().with_retry_budget(0);
        assert_eq!(config.retry_budget, 1);
    }
}
