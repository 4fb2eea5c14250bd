//! Session tuning.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::profile::RevisionProfile;

/// Retry and timing knobs for a [`DeviceSession`](crate::DeviceSession).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Per-response read bound in milliseconds. Unset uses the revision default.
    #[serde(default)]
    pub response_timeout_ms: Option<u64>,

    /// Total attempts for a NAKed frame, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Quiet period in milliseconds used when draining input during resync
    #[serde(default = "default_resync_quiet")]
    pub resync_quiet_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_resync_quiet() -> u64 {
    50
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: None,
            max_attempts: default_max_attempts(),
            resync_quiet_ms: default_resync_quiet(),
        }
    }
}

impl SessionConfig {
    /// Response timeout for `profile`.
    pub fn response_timeout(&self, profile: &RevisionProfile) -> Duration {
        self.response_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(profile.response_timeout)
    }

    /// Resync drain quiet period.
    pub fn resync_quiet(&self) -> Duration {
        Duration::from_millis(self.resync_quiet_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Revision;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: SessionConfig = toml::from_str("").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.max_attempts, 3);
        assert_eq!(
            config.response_timeout(Revision::C.profile()),
            Duration::from_millis(2000)
        );
    }

    #[test]
    fn test_timeout_override() {
        let config: SessionConfig = toml::from_str("response_timeout_ms = 250").unwrap();
        assert_eq!(
            config.response_timeout(Revision::A.profile()),
            Duration::from_millis(250)
        );
        assert_eq!(config.resync_quiet(), Duration::from_millis(50));
    }
}
