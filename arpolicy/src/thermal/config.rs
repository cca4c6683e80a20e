//! Thermal controller configuration.

use std::time::Duration;

use crate::quality::QualityTier;

/// Shortest allowed sampling interval.
pub const MIN_SAMPLE_INTERVAL: Duration = Duration::from_secs(2);

/// Longest allowed sampling interval.
pub const MAX_SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

/// Default sampling interval.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(3);

/// Default severity above which the tier steps down.
pub const DEFAULT_ESCALATE_THRESHOLD: f32 = 0.8;

/// Default severity below which the tier steps back up.
pub const DEFAULT_RESTORE_THRESHOLD: f32 = 0.4;

/// Default number of consecutive samples required to move a tier.
pub const DEFAULT_CONSECUTIVE_SAMPLES: u32 = 2;

/// Default number of consecutive cool samples at the forced ceiling that end
/// a degradation episode (30 s at the default interval).
pub const DEFAULT_EPISODE_CLEAR_SAMPLES: u32 = 10;

/// Hysteresis configuration for [`ThermalQualityController`](super::ThermalQualityController).
#[derive(Debug, Clone, PartialEq)]
pub struct ThermalConfig {
    /// Interval between samples when driven by the sampling loop.
    pub sample_interval: Duration,
    /// Severity strictly above this counts toward stepping down.
    pub escalate_threshold: f32,
    /// Severity strictly below this counts toward stepping up.
    pub restore_threshold: f32,
    /// Consecutive qualifying samples before a tier change.
    pub consecutive_samples: u32,
    /// Consecutive samples below `restore_threshold` while held at a forced
    /// ceiling before the degradation episode ends.
    pub episode_clear_samples: u32,
    /// Tier at startup and the highest tier restoration may reach.
    pub max_tier: QualityTier,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            escalate_threshold: DEFAULT_ESCALATE_THRESHOLD,
            restore_threshold: DEFAULT_RESTORE_THRESHOLD,
            consecutive_samples: DEFAULT_CONSECUTIVE_SAMPLES,
            episode_clear_samples: DEFAULT_EPISODE_CLEAR_SAMPLES,
            max_tier: QualityTier::High,
        }
    }
}

impl ThermalConfig {
    /// Check threshold ordering and ranges.
    pub fn validate(&self) -> Result<(), String> {
        let in_range = |v: f32| (0.0..=1.0).contains(&v);
        if !in_range(self.escalate_threshold) || !in_range(self.restore_threshold) {
            return Err("thresholds must be between 0.0 and 1.0".to_string());
        }
        if self.restore_threshold >= self.escalate_threshold {
            return Err(format!(
                "restore threshold {} must be lower than escalate threshold {}",
                self.restore_threshold, self.escalate_threshold
            ));
        }
        if self.consecutive_samples == 0 {
            return Err("consecutive_samples must be at least 1".to_string());
        }
        if self.episode_clear_samples == 0 {
            return Err("episode_clear_samples must be at least 1".to_string());
        }
        Ok(())
    }

    /// Clamp an interval into the supported 2–5 second range.
    pub fn clamp_interval(interval: Duration) -> Duration {
        interval.clamp(MIN_SAMPLE_INTERVAL, MAX_SAMPLE_INTERVAL)
    }
}
