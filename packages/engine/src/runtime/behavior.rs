// packages/engine/src/runtime/behavior.rs
//! Behavior profiles for simulated audience members
//!
//! A profile bundles the jitter bounds between actions, the recharge
//! probability tier and the recharge amount range. Profiles are validated
//! once at submission; the simulator assumes a valid profile.

use crate::utils::errors::{EngineError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Chance (percent) that an actor sends a message on a given loop iteration
pub const MESSAGE_PROBABILITY_PERCENT: u8 = 80;

/// Inclusive range of delays, in milliseconds, sampled uniformly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JitterRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl JitterRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// Both bounds must be positive and ordered.
    pub fn validate(&self, field: &'static str) -> Result<()> {
        if self.min_ms == 0 || self.max_ms == 0 {
            return Err(EngineError::validation(field, "interval bounds must be > 0"));
        }
        if self.min_ms > self.max_ms {
            return Err(EngineError::validation(
                field,
                format!("min {}ms exceeds max {}ms", self.min_ms, self.max_ms),
            ));
        }
        Ok(())
    }

    /// Draws a delay uniformly from `[min_ms, max_ms]`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        Duration::from_millis(rng.gen_range(self.min_ms..=self.max_ms))
    }

    pub fn min(&self) -> Duration {
        Duration::from_millis(self.min_ms)
    }
}

/// Inclusive recharge amount range (smallest currency unit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountRange {
    pub min: u64,
    pub max: u64,
}

impl AmountRange {
    pub fn validate(&self) -> Result<()> {
        if self.min == 0 {
            return Err(EngineError::validation("recharge_amount", "min must be > 0"));
        }
        if self.min > self.max {
            return Err(EngineError::validation(
                "recharge_amount",
                format!("min {} exceeds max {}", self.min, self.max),
            ));
        }
        Ok(())
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        rng.gen_range(self.min..=self.max)
    }
}

/// Which phases of the behavior loop are active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionToggles {
    pub enter: bool,
    pub message: bool,
    pub recharge: bool,
    pub leave: bool,
}

impl Default for ActionToggles {
    fn default() -> Self {
        Self {
            enter: true,
            message: true,
            recharge: true,
            leave: true,
        }
    }
}

/// Timing and consumption profile shared by every actor of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorProfile {
    pub toggles: ActionToggles,
    pub enter_jitter: JitterRange,
    pub message_jitter: JitterRange,
    pub recharge_jitter: JitterRange,
    pub leave_jitter: JitterRange,
    /// Percent chance (0-100) of attempting a recharge per loop iteration
    pub recharge_probability: u8,
    pub recharge_amount: AmountRange,
}

impl Default for BehaviorProfile {
    fn default() -> Self {
        Self {
            toggles: ActionToggles::default(),
            enter_jitter: JitterRange::new(100, 2_000),
            message_jitter: JitterRange::new(1_000, 5_000),
            recharge_jitter: JitterRange::new(2_000, 10_000),
            leave_jitter: JitterRange::new(100, 1_000),
            recharge_probability: 10,
            recharge_amount: AmountRange { min: 1, max: 500 },
        }
    }
}

impl BehaviorProfile {
    pub fn validate(&self) -> Result<()> {
        if self.recharge_probability > 100 {
            return Err(EngineError::validation(
                "recharge_probability",
                format!("{} is outside [0, 100]", self.recharge_probability),
            ));
        }
        self.enter_jitter.validate("enter_jitter")?;
        self.message_jitter.validate("message_jitter")?;
        self.recharge_jitter.validate("recharge_jitter")?;
        self.leave_jitter.validate("leave_jitter")?;
        self.recharge_amount.validate()?;
        Ok(())
    }

    /// Smallest configured delay; bounds worst-case stop latency.
    pub fn min_interval(&self) -> Duration {
        [
            self.enter_jitter,
            self.message_jitter,
            self.recharge_jitter,
            self.leave_jitter,
        ]
        .iter()
        .map(JitterRange::min)
        .min()
        .unwrap_or_default()
    }
}

/// Uniform percentage check: true with probability `percent / 100`.
pub fn roll_percent<R: Rng + ?Sized>(rng: &mut R, percent: u8) -> bool {
    rng.gen_range(0u8..100) < percent
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_default_profile_is_valid() {
        assert!(BehaviorProfile::default().validate().is_ok());
    }

    #[test]
    fn test_jitter_validation() {
        assert!(JitterRange::new(0, 10).validate("x").is_err());
        assert!(JitterRange::new(20, 10).validate("x").is_err());
        assert!(JitterRange::new(10, 10).validate("x").is_ok());
    }

    #[test]
    fn test_probability_out_of_range() {
        let profile = BehaviorProfile {
            recharge_probability: 101,
            ..Default::default()
        };
        let err = profile.validate().unwrap_err();
        assert!(err.to_string().contains("recharge_probability"));
    }

    #[test]
    fn test_sample_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let range = JitterRange::new(50, 80);
        for _ in 0..1_000 {
            let d = range.sample(&mut rng);
            assert!(d >= Duration::from_millis(50) && d <= Duration::from_millis(80));
        }
    }

    #[test]
    fn test_roll_percent_edges() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1_000 {
            assert!(!roll_percent(&mut rng, 0));
            assert!(roll_percent(&mut rng, 100));
        }
    }

    #[test]
    fn test_min_interval() {
        let profile = BehaviorProfile {
            leave_jitter: JitterRange::new(5, 10),
            ..Default::default()
        };
        assert_eq!(profile.min_interval(), Duration::from_millis(5));
    }
}
