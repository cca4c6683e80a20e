//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! The single place where INI key names are mapped to struct fields.

use std::path::PathBuf;
use std::str::FromStr;

use ini::{Ini, Properties};

use super::file::{ConfigFile, ConfigFileError};
use super::size::parse_size;
use crate::quality::LodSettings;

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse `section.key` with `FromStr` when present.
fn parse_field<T: FromStr>(
    props: &Properties,
    section: &str,
    key: &str,
    reason: &str,
) -> Result<Option<T>, ConfigFileError> {
    props
        .get(key)
        .map(|v| v.trim().parse().map_err(|_| invalid(section, key, v, reason)))
        .transpose()
}

fn parse_fraction(props: &Properties, section: &str, key: &str) -> Result<Option<f32>, ConfigFileError> {
    let value: Option<f32> = parse_field(props, section, key, "must be a number between 0.0 and 1.0")?;
    match value {
        Some(v) if !(0.0..=1.0).contains(&v) => Err(invalid(
            section,
            key,
            &v.to_string(),
            "must be a number between 0.0 and 1.0",
        )),
        other => Ok(other),
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(path),
    }
}

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [cache] section
    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = section.get("budget") {
            config.cache.budget = parse_size(v).map_err(|_| {
                invalid("cache", "budget", v, "expected format like '256MB', '1GB', or '512KB'")
            })?;
        }
        if let Some(v) = parse_field(section, "cache", "load_timeout_secs", "must be a positive integer (seconds)")? {
            if v == 0 {
                return Err(invalid("cache", "load_timeout_secs", "0", "must be a positive integer (seconds)"));
            }
            config.cache.load_timeout_secs = v;
        }
    }

    // [thermal] section
    if let Some(section) = ini.section(Some("thermal")) {
        if let Some(v) = parse_field(section, "thermal", "sample_interval_secs", "must be an integer between 2 and 5 (seconds)")? {
            config.thermal.sample_interval_secs = v;
        }
        if let Some(v) = parse_fraction(section, "thermal", "escalate_threshold")? {
            config.thermal.escalate_threshold = v;
        }
        if let Some(v) = parse_fraction(section, "thermal", "restore_threshold")? {
            config.thermal.restore_threshold = v;
        }
        if let Some(v) = parse_field(section, "thermal", "consecutive_samples", "must be a positive integer")? {
            config.thermal.consecutive_samples = v;
        }
        if let Some(v) = parse_field(section, "thermal", "episode_clear_samples", "must be a positive integer")? {
            if v == 0 {
                return Err(invalid("thermal", "episode_clear_samples", "0", "must be a positive integer"));
            }
            config.thermal.episode_clear_samples = v;
        }
    }
    config.thermal_config().validate().map_err(|reason| {
        invalid(
            "thermal",
            "restore_threshold",
            &config.thermal.restore_threshold.to_string(),
            &reason,
        )
    })?;

    // [recovery] section
    if let Some(section) = ini.section(Some("recovery")) {
        if let Some(v) = parse_field(section, "recovery", "max_attempts", "must be a non-negative integer")? {
            config.recovery.max_attempts = v;
        }
        if let Some(v) = parse_field(section, "recovery", "window_secs", "must be a positive integer (seconds)")? {
            config.recovery.window_secs = v;
        }
        if let Some(v) = section.get("backoff_secs") {
            config.recovery.backoff_secs = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<u64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| {
                    invalid(
                        "recovery",
                        "backoff_secs",
                        v,
                        "must be a comma-separated list of seconds, e.g. '1, 3, 8'",
                    )
                })?;
        }
        if let Some(v) = parse_field(section, "recovery", "history_size", "must be a non-negative integer")? {
            config.recovery.history_size = v;
        }
    }
    config.recovery_config().validate().map_err(|reason| {
        invalid(
            "recovery",
            "backoff_secs",
            &config
                .recovery
                .backoff_secs
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            &reason,
        )
    })?;

    // [lod] section
    if let Some(section) = ini.section(Some("lod")) {
        for (name, settings) in [
            ("low", &mut config.lod.low),
            ("medium", &mut config.lod.medium),
            ("high", &mut config.lod.high),
        ] {
            parse_lod(section, name, settings)?;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = expand_tilde(v);
            }
        }
    }

    // [preferences] section
    if let Some(section) = ini.section(Some("preferences")) {
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.preferences.file = expand_tilde(v);
            }
        }
    }

    Ok(config)
}

fn parse_lod(section: &Properties, tier: &str, settings: &mut LodSettings) -> Result<(), ConfigFileError> {
    let scale_reason = "must be a positive number";
    for (prefix, field) in [
        ("texture_scale", &mut settings.texture_scale),
        ("memory_scale", &mut settings.memory_scale),
    ] {
        let key = format!("{prefix}_{tier}");
        if let Some(v) = parse_field::<f32>(section, "lod", &key, scale_reason)? {
            if v <= 0.0 {
                return Err(invalid("lod", &key, &v.to_string(), scale_reason));
            }
            *field = v;
        }
    }
    if let Some(v) = parse_fraction(section, "lod", &format!("shadow_intensity_{tier}"))? {
        settings.shadow_intensity = v;
    }
    Ok(())
}
