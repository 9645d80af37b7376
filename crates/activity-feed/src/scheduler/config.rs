//! Scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::period::Period;

/// Immutable timing configuration for a [`PollingScheduler`](super::PollingScheduler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Fire one poll attempt as soon as the scheduler starts.
    #[serde(default = "default_poll_on_start")]
    pub poll_on_start: bool,
    /// Minimum spacing between the end of one poll and the start of the
    /// next. Focus-aware.
    #[serde(default = "default_min_poll_delay")]
    pub min_poll_delay: Period,
    /// Grace delay after a disconnect before fallback polling starts.
    #[serde(default = "default_polling_start_delay_ms")]
    pub polling_start_delay_ms: u64,
    /// Cadence while the socket is down. Focus-aware.
    #[serde(default = "default_polling_period")]
    pub polling_period: Period,
    /// Safety-net cadence while the socket claims to be connected.
    #[serde(default = "default_forced_polling_period")]
    pub forced_polling_period: Period,
}

fn default_poll_on_start() -> bool {
    true
}

fn default_min_poll_delay() -> Period {
    Period::ordered(1_000, 2_000)
}

fn default_polling_start_delay_ms() -> u64 {
    3_000
}

fn default_polling_period() -> Period {
    Period::ordered(10_000, 15_000)
}

fn default_forced_polling_period() -> Period {
    Period::ordered(60_000, 90_000)
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_on_start: default_poll_on_start(),
            min_poll_delay: default_min_poll_delay(),
            polling_start_delay_ms: default_polling_start_delay_ms(),
            polling_period: default_polling_period(),
            forced_polling_period: default_forced_polling_period(),
        }
    }
}

impl SchedulerConfig {
    /// Grace delay before the first fallback poll.
    pub fn polling_start_delay(&self) -> Duration {
        Duration::from_millis(self.polling_start_delay_ms)
    }

    /// Reject cadences that could re-arm with a zero delay.
    ///
    /// A self-rearming timer with a zero delay would spin on the runtime.
    pub fn validate(&self) -> Result<()> {
        for (name, period) in [
            ("polling_period", &self.polling_period),
            ("forced_polling_period", &self.forced_polling_period),
        ] {
            if period.min_ms() == 0 {
                return Err(Error::config(format!(
                    "{name} must be at least 1ms, got {period}"
                )));
            }
        }
        Ok(())
    }

    /// Parse a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}
