//! Configuration file handling for ~/.arpolicy/config.ini.
//!
//! Parsing lives in [`super::parser`], serialization in [`super::writer`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::asset::{CacheConfig, DEFAULT_CACHE_BUDGET_BYTES, DEFAULT_LOAD_TIMEOUT};
use crate::fallback::{
    RecoveryConfig, DEFAULT_BACKOFF_SECS, DEFAULT_HISTORY_SIZE, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_RETRY_WINDOW,
};
use crate::quality::{LodProfile, QualityTier};
use crate::thermal::{
    ThermalConfig, DEFAULT_CONSECUTIVE_SAMPLES, DEFAULT_EPISODE_CLEAR_SAMPLES,
    DEFAULT_ESCALATE_THRESHOLD,
    DEFAULT_RESTORE_THRESHOLD, DEFAULT_SAMPLE_INTERVAL,
};

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to write config file
    #[error("Failed to write config file: {0}")]
    WriteError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Failed to create config directory
    #[error("Failed to create config directory: {0}")]
    DirectoryError(std::io::Error),
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    pub budget: u64,
    pub load_timeout_secs: u64,
}

/// `[thermal]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermalSettings {
    pub sample_interval_secs: u64,
    pub escalate_threshold: f32,
    pub restore_threshold: f32,
    pub consecutive_samples: u32,
    pub episode_clear_samples: u32,
}

/// `[recovery]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoverySettings {
    pub max_attempts: u32,
    pub window_secs: u64,
    pub backoff_secs: Vec<u64>,
    pub history_size: usize,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub file: PathBuf,
}

/// `[preferences]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct PreferencesSettings {
    pub file: PathBuf,
}

/// Contents of `config.ini`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub cache: CacheSettings,
    pub thermal: ThermalSettings,
    pub recovery: RecoverySettings,
    /// `[lod]` section.
    pub lod: LodProfile,
    pub logging: LoggingSettings,
    pub preferences: PreferencesSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            cache: CacheSettings {
                budget: DEFAULT_CACHE_BUDGET_BYTES,
                load_timeout_secs: DEFAULT_LOAD_TIMEOUT.as_secs(),
            },
            thermal: ThermalSettings {
                sample_interval_secs: DEFAULT_SAMPLE_INTERVAL.as_secs(),
                escalate_threshold: DEFAULT_ESCALATE_THRESHOLD,
                restore_threshold: DEFAULT_RESTORE_THRESHOLD,
                consecutive_samples: DEFAULT_CONSECUTIVE_SAMPLES,
                episode_clear_samples: DEFAULT_EPISODE_CLEAR_SAMPLES,
            },
            recovery: RecoverySettings {
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                window_secs: DEFAULT_RETRY_WINDOW.as_secs(),
                backoff_secs: DEFAULT_BACKOFF_SECS.to_vec(),
                history_size: DEFAULT_HISTORY_SIZE,
            },
            lod: LodProfile::default(),
            logging: LoggingSettings {
                file: default_log_file_path(),
            },
            preferences: PreferencesSettings {
                file: default_preferences_path(),
            },
        }
    }
}

impl ConfigFile {
    /// Load configuration from the default path (~/.arpolicy/config.ini).
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }

    /// Save configuration to the default path (~/.arpolicy/config.ini).
    pub fn save(&self) -> Result<(), ConfigFileError> {
        self.save_to(&config_file_path())
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::DirectoryError)?;
        }

        std::fs::write(path, self.to_ini_string())
            .map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }

    /// Render the configuration as commented INI text.
    pub fn to_ini_string(&self) -> String {
        super::writer::to_config_string(self)
    }

    /// Create the default config file at `path` if it doesn't exist.
    pub fn ensure_exists_at(path: &Path) -> Result<(), ConfigFileError> {
        if !path.exists() {
            Self::default().save_to(path)?;
        }
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            budget_bytes: self.cache.budget,
            load_timeout: Duration::from_secs(self.cache.load_timeout_secs),
            lod: self.lod.clone(),
        }
    }

    /// Thermal configuration with the sample interval clamped to 2–5 s.
    pub fn thermal_config(&self) -> ThermalConfig {
        ThermalConfig {
            sample_interval: ThermalConfig::clamp_interval(Duration::from_secs(
                self.thermal.sample_interval_secs,
            )),
            escalate_threshold: self.thermal.escalate_threshold,
            restore_threshold: self.thermal.restore_threshold,
            consecutive_samples: self.thermal.consecutive_samples,
            episode_clear_samples: self.thermal.episode_clear_samples,
            max_tier: QualityTier::High,
        }
    }

    pub fn recovery_config(&self) -> RecoveryConfig {
        RecoveryConfig {
            max_attempts: self.recovery.max_attempts,
            window: Duration::from_secs(self.recovery.window_secs),
            backoff: self
                .recovery
                .backoff_secs
                .iter()
                .map(|secs| Duration::from_secs(*secs))
                .collect(),
            history_size: self.recovery.history_size,
        }
    }
}

/// Get the path to the config directory (~/.arpolicy).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".arpolicy")
}

/// Get the path to the config file (~/.arpolicy/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

/// Default log file (~/.arpolicy/logs/arpolicy.log).
pub fn default_log_file_path() -> PathBuf {
    config_directory().join("logs").join("arpolicy.log")
}

/// Default preference store (~/.arpolicy/preferences.ini).
pub fn default_preferences_path() -> PathBuf {
    config_directory().join("preferences.ini")
}
