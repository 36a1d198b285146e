use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lower bound on the reminder poll interval, applied whenever it is read.
pub const MIN_POLL_INTERVAL_SECS: u64 = 5;

/// Hot-reloadable reminder scheduler parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// As configured. May be below the floor; see [`Self::effective_poll_interval`].
    pub poll_interval_secs: u64,
    pub notifications_enabled: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            notifications_enabled: true,
        }
    }
}

impl SchedulerSettings {
    pub fn effective_poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(MIN_POLL_INTERVAL_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_interval_has_a_floor() {
        let settings = SchedulerSettings {
            poll_interval_secs: 1,
            notifications_enabled: true,
        };
        assert_eq!(settings.effective_poll_interval(), Duration::from_secs(5));

        let settings = SchedulerSettings {
            poll_interval_secs: 0,
            ..settings
        };
        assert_eq!(settings.effective_poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn poll_interval_above_floor_is_kept() {
        let settings = SchedulerSettings::default();
        assert_eq!(settings.effective_poll_interval(), Duration::from_secs(60));
    }
}
