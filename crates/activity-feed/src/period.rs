//! Jittered delay ranges.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A closed `[min, max]` range of milliseconds from which delays are sampled.
///
/// Sampling a fresh delay for every timer spreads the load of many clients
/// that would otherwise poll in lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPeriod")]
pub struct Period {
    min: u64,
    max: u64,
}

#[derive(Deserialize)]
struct RawPeriod {
    min: u64,
    max: u64,
}

impl TryFrom<RawPeriod> for Period {
    type Error = Error;

    fn try_from(raw: RawPeriod) -> Result<Self> {
        Period::new(raw.min, raw.max)
    }
}

impl Period {
    /// Create a period, rejecting ranges where `min > max`.
    pub fn new(min: u64, max: u64) -> Result<Self> {
        if min > max {
            return Err(Error::config(format!(
                "period min ({min}ms) must not exceed max ({max}ms)"
            )));
        }
        Ok(Self { min, max })
    }

    /// Build a period from two bounds given in either order.
    pub const fn ordered(a: u64, b: u64) -> Self {
        if a <= b {
            Self { min: a, max: b }
        } else {
            Self { min: b, max: a }
        }
    }

    /// A period that always yields the same delay.
    pub const fn fixed(ms: u64) -> Self {
        Self { min: ms, max: ms }
    }

    /// Lower bound in milliseconds.
    pub fn min_ms(&self) -> u64 {
        self.min
    }

    /// Upper bound in milliseconds.
    pub fn max_ms(&self) -> u64 {
        self.max
    }

    /// Sample a delay uniformly from the range.
    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return Duration::from_millis(self.min);
        }
        let span = (self.max - self.min).saturating_add(1);
        let offset = rand::random::<u64>() % span;
        Duration::from_millis(self.min + offset)
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.min == self.max {
            write!(f, "{}ms", self.min)
        } else {
            write!(f, "{}..={}ms", self.min, self.max)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_period_samples_exact_delay() {
        let period = Period::fixed(5000);
        for _ in 0..10 {
            assert_eq!(period.sample(), Duration::from_millis(5000));
        }
    }

    #[test]
    fn test_sample_stays_in_range() {
        let period = Period::new(100, 200).unwrap();
        for _ in 0..1000 {
            let delay = period.sample();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(200));
        }
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert!(matches!(
            Period::new(300, 200),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_full_range_does_not_overflow() {
        let period = Period::new(0, u64::MAX).unwrap();
        let _ = period.sample();
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Period = serde_json::from_str(r#"{"min": 10, "max": 20}"#).unwrap();
        assert_eq!(ok, Period::new(10, 20).unwrap());

        let err = serde_json::from_str::<Period>(r#"{"min": 30, "max": 20}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_ordered_swaps_bounds() {
        assert_eq!(Period::ordered(20, 10), Period::new(10, 20).unwrap());
        assert_eq!(Period::ordered(7, 7), Period::fixed(7));
    }

    #[test]
    fn test_display() {
        assert_eq!(Period::fixed(250).to_string(), "250ms");
        assert_eq!(Period::new(1, 2).unwrap().to_string(), "1..=2ms");
    }
}
