//! Quality tiers and per-tier level-of-detail settings.
//!
//! [`QualityTier`] is the single ordered quality scale shared by the asset
//! cache, the thermal controller and the fallback policy. The process-wide
//! current tier lives in a [`SharedTier`], which is written only by the
//! thermal controller and read everywhere else.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Discrete quality level of a rendered asset.
///
/// Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    /// Smallest meshes and textures.
    Low,
    /// Balanced default for mid-range devices.
    Medium,
    /// Full-fidelity assets.
    High,
}

impl QualityTier {
    /// All tiers from lowest to highest.
    pub const ALL: [QualityTier; 3] = [QualityTier::Low, QualityTier::Medium, QualityTier::High];

    /// The next lower tier, or `None` at the floor.
    pub fn lower(self) -> Option<Self> {
        match self {
            QualityTier::Low => None,
            QualityTier::Medium => Some(QualityTier::Low),
            QualityTier::High => Some(QualityTier::Medium),
        }
    }

    /// The next higher tier, or `None` at the ceiling.
    pub fn higher(self) -> Option<Self> {
        match self {
            QualityTier::Low => Some(QualityTier::Medium),
            QualityTier::Medium => Some(QualityTier::High),
            QualityTier::High => None,
        }
    }

    /// The next lower tier, clamped at [`QualityTier::Low`].
    pub fn lower_clamped(self) -> Self {
        self.lower().unwrap_or(QualityTier::Low)
    }

    /// Short lowercase name used in logs and config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            QualityTier::Low => 0,
            QualityTier::Medium => 1,
            QualityTier::High => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => QualityTier::Low,
            1 => QualityTier::Medium,
            _ => QualityTier::High,
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a tier name.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid quality tier '{0}' - expected low, medium or high")]
pub struct TierParseError(String);

impl FromStr for QualityTier {
    type Err = TierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(QualityTier::Low),
            "medium" => Ok(QualityTier::Medium),
            "high" => Ok(QualityTier::High),
            _ => Err(TierParseError(s.to_string())),
        }
    }
}

/// The process-wide current quality tier.
///
/// Cloning shares the same underlying value. Writes are a single atomic store,
/// so readers never observe an intermediate state.
#[derive(Debug, Clone)]
pub struct SharedTier {
    value: Arc<AtomicU8>,
}

impl SharedTier {
    /// Create a shared tier starting at `initial`.
    pub fn new(initial: QualityTier) -> Self {
        Self {
            value: Arc::new(AtomicU8::new(initial.to_u8())),
        }
    }

    /// Latest committed tier.
    pub fn get(&self) -> QualityTier {
        QualityTier::from_u8(self.value.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, tier: QualityTier) {
        self.value.store(tier.to_u8(), Ordering::Release);
    }
}

impl Default for SharedTier {
    fn default() -> Self {
        Self::new(QualityTier::High)
    }
}

/// Rendering parameters applied at one tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LodSettings {
    /// Texture resolution multiplier relative to the source asset.
    pub texture_scale: f32,
    /// Shadow intensity (0.0 disables shadows).
    pub shadow_intensity: f32,
    /// Estimated memory footprint relative to the High tier.
    pub memory_scale: f32,
}

/// Per-tier LOD settings.
///
/// The defaults halve texture size and shadow intensity per step down.
#[derive(Debug, Clone, PartialEq)]
pub struct LodProfile {
    pub low: LodSettings,
    pub medium: LodSettings,
    pub high: LodSettings,
}

impl LodProfile {
    /// Settings for the given tier.
    pub fn settings(&self, tier: QualityTier) -> LodSettings {
        match tier {
            QualityTier::Low => self.low,
            QualityTier::Medium => self.medium,
            QualityTier::High => self.high,
        }
    }

    /// Scale a byte estimate taken at `from` to what it would be at `to`.
    pub fn rescale_bytes(&self, bytes: u64, from: QualityTier, to: QualityTier) -> u64 {
        let from_scale = self.settings(from).memory_scale;
        let to_scale = self.settings(to).memory_scale;
        if from_scale <= 0.0 {
            return bytes;
        }
        ((bytes as f64) * (to_scale as f64 / from_scale as f64)).round() as u64
    }
}

impl Default for LodProfile {
    fn default() -> Self {
        Self {
            low: LodSettings {
                texture_scale: 0.25,
                shadow_intensity: 0.25,
                memory_scale: 0.25,
            },
            medium: LodSettings {
                texture_scale: 0.5,
                shadow_intensity: 0.5,
                memory_scale: 0.5,
            },
            high: LodSettings {
                texture_scale: 1.0,
                shadow_intensity: 1.0,
                memory_scale: 1.0,
            },
        }
    }
}
