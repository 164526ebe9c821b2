//! Installer configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning of the cycle driver and the relink protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerConfig {
    /// Upper bound on how long the worker sleeps without being woken.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// How long a relink waits for the container's acknowledgement.
    #[serde(default = "default_relink_timeout_secs")]
    pub relink_timeout_secs: u64,

    /// Poll interval while waiting for the relink acknowledgement.
    #[serde(default = "default_relink_poll_interval_ms")]
    pub relink_poll_interval_ms: u64,

    /// Re-diff every group after an idle timeout.
    #[serde(default = "default_resync_on_idle")]
    pub resync_on_idle: bool,
}

fn default_idle_timeout_ms() -> u64 {
    5000
}

fn default_relink_timeout_secs() -> u64 {
    30
}

fn default_relink_poll_interval_ms() -> u64 {
    250
}

fn default_resync_on_idle() -> bool {
    true
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: default_idle_timeout_ms(),
            relink_timeout_secs: default_relink_timeout_secs(),
            relink_poll_interval_ms: default_relink_poll_interval_ms(),
            resync_on_idle: default_resync_on_idle(),
        }
    }
}

impl InstallerConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn relink_timeout(&self) -> Duration {
        Duration::from_secs(self.relink_timeout_secs)
    }

    pub fn relink_poll_interval(&self) -> Duration {
        Duration::from_millis(self.relink_poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = InstallerConfig::default();
        assert_eq!(config.relink_timeout(), Duration::from_secs(30));
        assert_eq!(config.relink_poll_interval(), Duration::from_millis(250));
        assert_eq!(config.idle_timeout(), Duration::from_secs(5));
        assert!(config.resync_on_idle);
    }

    #[test]
    fn test_partial_deserialize() {
        let config: InstallerConfig = serde_json::from_str(r#"{"relink_timeout_secs": 5}"#).unwrap();
        assert_eq!(config.relink_timeout_secs, 5);
        assert_eq!(config.relink_poll_interval_ms, 250);
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let config = InstallerConfig {
            relink_poll_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.relink_poll_interval(), Duration::from_millis(1));
    }
}
