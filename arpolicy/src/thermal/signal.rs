//! Thermal/performance signal source boundary.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Errors reading the platform severity signal.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SignalError {
    /// The platform did not provide a reading.
    #[error("Thermal signal unavailable: {0}")]
    Unavailable(String),

    /// The reading was not a normalized severity.
    #[error("Thermal severity {0} outside 0.0..=1.0")]
    OutOfRange(f32),
}

/// Normalized thermal/performance severity reader.
///
/// `0.0` is nominal, `1.0` is critical.
pub trait SeveritySource: Send + Sync {
    fn read_severity(&self) -> Result<f32, SignalError>;
}

/// Severity value set by another component (platform bridge, tests, CLI).
///
/// Stored as raw `f32` bits in an atomic so writers never block the sampler.
#[derive(Debug, Clone)]
pub struct SharedSeverity {
    bits: Arc<AtomicU32>,
}

impl SharedSeverity {
    pub fn new(initial: f32) -> Self {
        Self {
            bits: Arc::new(AtomicU32::new(initial.to_bits())),
        }
    }

    pub fn set(&self, severity: f32) {
        self.bits.store(severity.to_bits(), Ordering::Release);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }
}

impl Default for SharedSeverity {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl SeveritySource for SharedSeverity {
    fn read_severity(&self) -> Result<f32, SignalError> {
        Ok(self.get())
    }
}
