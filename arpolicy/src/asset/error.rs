//! Asset cache errors.

use std::time::Duration;

use thiserror::Error;

use super::loader::LoadError;
use super::types::AssetKey;

/// Errors surfaced by [`AssetCache`](super::AssetCache).
///
/// `Clone` so one load outcome can be delivered to every coalesced caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// The loader reported a failure.
    #[error("Failed to load {key}: {source}")]
    Load { key: AssetKey, source: LoadError },

    /// The loader did not finish within the configured timeout.
    #[error("Loading {key} timed out after {}ms", .timeout.as_millis())]
    LoadTimeout { key: AssetKey, timeout: Duration },

    /// Room could not be made for the record even after evicting everything
    /// evictable.
    #[error("Cache budget exceeded for {key}: needs {required} bytes, {available} available")]
    BudgetExceeded {
        key: AssetKey,
        required: u64,
        available: u64,
    },

    /// `degrade` found no Medium/High record for the identifier.
    #[error("No degradable record resident for '{identifier}'")]
    NotResident { identifier: String },

    /// The session is suspended; new resolves are not accepted.
    #[error("Cache is suspended")]
    Suspended,

    /// The cache was cleared on session disposal.
    #[error("Cache is closed")]
    Closed,

    /// The load task ended without producing a result.
    #[error("Load of {key} was aborted")]
    LoadAborted { key: AssetKey },
}

impl CacheError {
    /// Key of the asset involved, when there is one.
    pub fn key(&self) -> Option<&AssetKey> {
        match self {
            CacheError::Load { key, .. }
            | CacheError::LoadTimeout { key, .. }
            | CacheError::BudgetExceeded { key, .. }
            | CacheError::LoadAborted { key } => Some(key),
            CacheError::NotResident { .. } | CacheError::Suspended | CacheError::Closed => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::QualityTier;

    #[test]
    fn test_cache_error_display() {
        let err = CacheError::LoadTimeout {
            key: AssetKey::new("cat", QualityTier::High),
            timeout: Duration::from_secs(10),
        };
        assert_eq!(err.to_string(), "Loading cat@high timed out after 10000ms");

        let err = CacheError::BudgetExceeded {
            key: AssetKey::new("cat", QualityTier::Low),
            required: 100,
            available: 40,
        };
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("40"));
    }

    #[test]
    fn test_cache_error_key() {
        let key = AssetKey::new("dog", QualityTier::Medium);
        let err = CacheError::LoadAborted { key: key.clone() };
        assert_eq!(err.key(), Some(&key));
        assert_eq!(CacheError::Suspended.key(), None);
    }
}
