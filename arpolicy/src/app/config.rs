//! Application configuration for [`ArApp`](super::ArApp).
//!
//! Combines the component configurations needed to bootstrap the policy
//! layer.

use crate::asset::CacheConfig;
use crate::config::ConfigFile;
use crate::fallback::RecoveryConfig;
use crate::thermal::ThermalConfig;

/// Application configuration combining all component configs.
#[derive(Clone, Debug, Default)]
pub struct AppConfig {
    /// Asset cache budget, load timeout and LOD profile.
    pub cache: CacheConfig,

    /// Thermal hysteresis and sampling interval.
    pub thermal: ThermalConfig,

    /// Retry budget and failure history.
    pub recovery: RecoveryConfig,
}

impl AppConfig {
    /// Create application config from the configuration file.
    pub fn from_config_file(config: &ConfigFile) -> Self {
        Self {
            cache: config.cache_config(),
            thermal: config.thermal_config(),
            recovery: config.recovery_config(),
        }
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_thermal(mut self, thermal: ThermalConfig) -> Self {
        self.thermal = thermal;
        self
    }

    pub fn with_recovery(mut self, recovery: RecoveryConfig) -> Self {
        self.recovery = recovery;
        self
    }

    /// Check every component configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.thermal
            .validate()
            .map_err(|e| format!("thermal: {e}"))?;
        self.recovery
            .validate()
            .map_err(|e| format!("recovery: {e}"))?;
        if self.cache.load_timeout.is_zero() {
            return Err("cache: load timeout must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_from_config_file() {
        let mut file = ConfigFile::default();
        file.cache.budget = 1024;
        file.recovery.max_attempts = 1;

        let config = AppConfig::from_config_file(&file);
        assert_eq!(config.cache.budget_bytes, 1024);
        assert_eq!(config.recovery.max_attempts, 1);
    }

    #[test]
    fn test_validate_reports_component() {
        let config = AppConfig::default().with_cache(
            CacheConfig::default().with_load_timeout(Duration::ZERO),
        );
        assert!(config.validate().unwrap_err().starts_with("cache"));

        let thermal = ThermalConfig {
            restore_threshold: 0.9,
            ..ThermalConfig::default()
        };
        let config = AppConfig::default().with_thermal(thermal);
        assert!(config.validate().unwrap_err().starts_with("thermal"));
    }
}
