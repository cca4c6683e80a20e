//! Thermal/performance monitoring and adaptive quality tiers.
//!
//! [`ThermalQualityController`] polls a [`SeveritySource`] and owns the
//! process-wide current [`QualityTier`](crate::quality::QualityTier).

mod config;
mod controller;
mod signal;

pub use config::{
    ThermalConfig, DEFAULT_CONSECUTIVE_SAMPLES, DEFAULT_EPISODE_CLEAR_SAMPLES,
    DEFAULT_ESCALATE_THRESHOLD,
    DEFAULT_RESTORE_THRESHOLD, DEFAULT_SAMPLE_INTERVAL, MAX_SAMPLE_INTERVAL, MIN_SAMPLE_INTERVAL,
};
pub use controller::{ThermalQualityController, TierChange, TierChangeCause};
pub use signal::{SeveritySource, SharedSeverity, SignalError};
