//! User configuration (~/.arpolicy/config.ini).
//!
//! [`ConfigFile`] mirrors the INI layout and converts into the component
//! configurations:
//!
//! ```
//! use arpolicy::config::ConfigFile;
//!
//! let config = ConfigFile::default();
//! let cache = config.cache_config();
//! let thermal = config.thermal_config();
//! assert!(thermal.validate().is_ok());
//! assert_eq!(cache.budget_bytes, 256 * 1024 * 1024);
//! ```

mod file;
mod parser;
mod size;
mod writer;

pub use file::{
    config_directory, config_file_path, default_log_file_path, default_preferences_path,
    CacheSettings, ConfigFile, ConfigFileError, LoggingSettings, PreferencesSettings,
    RecoverySettings, ThermalSettings,
};
pub use size::{format_size, parse_size, SizeParseError};
