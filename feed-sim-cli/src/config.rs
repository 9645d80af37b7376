//! Simulator configuration, loaded from TOML.

use std::path::Path;

use activity_feed::{Period, SchedulerConfig};
use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Top-level configuration file: a `[scheduler]` and a `[simulation]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub simulation: SimulationConfig,
}

/// Behaviour of the simulated socket and API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Total simulated time.
    pub duration_ms: u64,
    pub start_connected: bool,
    /// How long the socket stays up once connected.
    pub socket_up_ms: Period,
    /// How long the socket stays down once dropped.
    pub socket_down_ms: Period,
    /// Probability that a connected socket silently stops delivering.
    pub stall_rate: f64,
    /// Spacing between newly created activities.
    pub new_activity_ms: Period,
    /// Time until a pending activity confirms.
    pub confirm_after_ms: Period,
    /// Latency of one API page fetch.
    pub api_latency_ms: Period,
    /// Probability that a page fetch fails.
    pub failure_rate: f64,
    /// Entries returned per head page.
    pub page_size: usize,
    /// Send the app to the background every N ms, if set.
    pub background_every_ms: Option<u64>,
    /// How long each background phase lasts.
    pub background_for_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            duration_ms: 300_000,
            start_connected: true,
            socket_up_ms: Period::ordered(20_000, 60_000),
            socket_down_ms: Period::ordered(10_000, 30_000),
            stall_rate: 0.25,
            new_activity_ms: Period::ordered(2_000, 8_000),
            confirm_after_ms: Period::ordered(5_000, 20_000),
            api_latency_ms: Period::ordered(150, 900),
            failure_rate: 0.1,
            page_size: 25,
            background_every_ms: None,
            background_for_ms: 15_000,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.duration_ms > 0, "duration_ms must be positive");
        ensure!(self.page_size > 0, "page_size must be positive");
        ensure!(
            (0.0..=1.0).contains(&self.failure_rate),
            "failure_rate must be within [0, 1], got {}",
            self.failure_rate
        );
        ensure!(
            (0.0..=1.0).contains(&self.stall_rate),
            "stall_rate must be within [0, 1], got {}",
            self.stall_rate
        );
        for (name, period) in [
            ("socket_up_ms", &self.socket_up_ms),
            ("socket_down_ms", &self.socket_down_ms),
            ("new_activity_ms", &self.new_activity_ms),
        ] {
            ensure!(period.min_ms() > 0, "{name} must be at least 1ms, got {period}");
        }
        if let Some(every) = self.background_every_ms {
            ensure!(every > 0, "background_every_ms must be positive");
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load the configuration file, falling back to defaults when no path
    /// is given or the file does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            debug!("No configuration file given, using defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            warn!("Configuration file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate()?;
        self.simulation.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.simulation.start_connected);
    }

    #[test]
    fn test_partial_toml() {
        let config = AppConfig::from_toml(
            r#"
            [scheduler]
            poll_on_start = false
            polling_period = { min = 4000, max = 6000 }

            [simulation]
            duration_ms = 60000
            failure_rate = 0.5
            "#,
        )
        .unwrap();

        assert!(!config.scheduler.poll_on_start);
        assert_eq!(config.scheduler.polling_period, Period::ordered(4_000, 6_000));
        assert_eq!(config.scheduler.polling_start_delay_ms, 3_000);
        assert_eq!(config.simulation.duration_ms, 60_000);
        assert_eq!(config.simulation.failure_rate, 0.5);
        assert_eq!(config.simulation.page_size, 25);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        assert_eq!(AppConfig::from_toml("").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(AppConfig::from_toml("[simulation]\nfailure_rate = 1.5").is_err());
        assert!(AppConfig::from_toml("[simulation]\npage_size = 0").is_err());
        assert!(
            AppConfig::from_toml("[scheduler]\nmin_poll_delay = { min = 9, max = 1 }").is_err()
        );
        assert!(
            AppConfig::from_toml("[scheduler]\nforced_polling_period = { min = 0, max = 0 }")
                .is_err()
        );
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = AppConfig::load(Some(Path::new("/nonexistent/feed-sim.toml"))).unwrap();
        assert_eq!(config, AppConfig::default());
    }
}
