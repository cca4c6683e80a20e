//! Preference store boundary.
//!
//! The only preference the core reads is [`AR_ENABLED_KEY`], which decides
//! whether an AR session is ever started.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ini::Ini;
use parking_lot::Mutex;
use thiserror::Error;

/// Preference key gating the AR path.
pub const AR_ENABLED_KEY: &str = "ar_enabled";

/// INI section holding boolean preferences.
const PREFERENCES_SECTION: &str = "preferences";

/// Preference store errors.
#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("Failed to read preferences: {0}")]
    Read(#[from] ini::Error),

    #[error("Failed to write preferences to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid preference {key} = '{value}': expected true or false")]
    InvalidValue { key: String, value: String },
}

/// Boolean key/value preferences.
pub trait PreferenceStore: Send + Sync {
    /// Value for `key`, `false` when unset.
    fn get_bool(&self, key: &str) -> Result<bool, PreferenceError>;

    fn set_bool(&self, key: &str, value: bool) -> Result<(), PreferenceError>;
}

/// Preferences kept in memory only.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<HashMap<String, bool>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with AR enabled.
    pub fn ar_enabled() -> Self {
        let store = Self::new();
        store.values.lock().insert(AR_ENABLED_KEY.to_string(), true);
        store
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get_bool(&self, key: &str) -> Result<bool, PreferenceError> {
        Ok(self.values.lock().get(key).copied().unwrap_or(false))
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<(), PreferenceError> {
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }
}

/// Preferences persisted in the `[preferences]` section of an INI file.
///
/// Every write rewrites the whole file.
#[derive(Debug)]
pub struct IniPreferenceStore {
    path: PathBuf,
    // Serializes read-modify-write cycles.
    lock: Mutex<()>,
}

impl IniPreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Ini, PreferenceError> {
        if !self.path.exists() {
            return Ok(Ini::new());
        }
        Ok(Ini::load_from_file(&self.path)?)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, PreferenceError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(PreferenceError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

impl PreferenceStore for IniPreferenceStore {
    fn get_bool(&self, key: &str) -> Result<bool, PreferenceError> {
        let _guard = self.lock.lock();
        let ini = self.load()?;
        match ini
            .section(Some(PREFERENCES_SECTION))
            .and_then(|section| section.get(key))
        {
            Some(value) => parse_bool(key, value),
            None => Ok(false),
        }
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<(), PreferenceError> {
        let _guard = self.lock.lock();
        let mut ini = self.load()?;
        ini.with_section(Some(PREFERENCES_SECTION))
            .set(key, if value { "true" } else { "false" });

        let write_err = |source| PreferenceError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        ini.write_to_file(&self.path).map_err(write_err)?;
        tracing::debug!(key, value, path = %self.path.display(), "Preference saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_defaults_false() {
        let store = MemoryPreferenceStore::new();
        assert!(!store.get_bool(AR_ENABLED_KEY).unwrap());
        store.set_bool(AR_ENABLED_KEY, true).unwrap();
        assert!(store.get_bool(AR_ENABLED_KEY).unwrap());
        assert!(MemoryPreferenceStore::ar_enabled()
            .get_bool(AR_ENABLED_KEY)
            .unwrap());
    }

    #[test]
    fn test_ini_store_missing_file_is_false() {
        let dir = TempDir::new().unwrap();
        let store = IniPreferenceStore::new(dir.path().join("prefs.ini"));
        assert!(!store.get_bool(AR_ENABLED_KEY).unwrap());
    }

    #[test]
    fn test_ini_store_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("prefs.ini");

        IniPreferenceStore::new(&path)
            .set_bool(AR_ENABLED_KEY, true)
            .unwrap();
        let reopened = IniPreferenceStore::new(&path);
        assert!(reopened.get_bool(AR_ENABLED_KEY).unwrap());

        reopened.set_bool(AR_ENABLED_KEY, false).unwrap();
        assert!(!IniPreferenceStore::new(&path)
            .get_bool(AR_ENABLED_KEY)
            .unwrap());
    }

    #[test]
    fn test_ini_store_keeps_other_keys() {
        let dir = TempDir::new().unwrap();
        let store = IniPreferenceStore::new(dir.path().join("prefs.ini"));
        store.set_bool("haptics", true).unwrap();
        store.set_bool(AR_ENABLED_KEY, true).unwrap();
        assert!(store.get_bool("haptics").unwrap());
    }

    #[test]
    fn test_ini_store_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs.ini");
        std::fs::write(&path, "[preferences]\nar_enabled = maybe\n").unwrap();

        let err = IniPreferenceStore::new(&path)
            .get_bool(AR_ENABLED_KEY)
            .unwrap_err();
        assert!(matches!(err, PreferenceError::InvalidValue { .. }));
    }

    #[test]
    fn test_parse_bool_variants() {
        assert!(parse_bool("k", " Yes ").unwrap());
        assert!(!parse_bool("k", "0").unwrap());
    }
}
