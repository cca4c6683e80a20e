//! INI serialization logic for converting `ConfigFile` → INI string.

use super::file::ConfigFile;
use super::size::format_size;
use crate::quality::LodSettings;

fn lod_lines(tier: &str, settings: &LodSettings) -> String {
    format!(
        "texture_scale_{tier} = {}\nshadow_intensity_{tier} = {}\nmemory_scale_{tier} = {}\n",
        settings.texture_scale, settings.shadow_intensity, settings.memory_scale
    )
}

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let backoff = config
        .recovery
        .backoff_secs
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"[cache]
; Soft cap on the estimated size of all resident 3D assets (default: 256MB)
; Supports: KB, MB, GB suffixes (e.g., 128MB, 1GB)
budget = {}
; Seconds before a single asset load fails with a timeout (default: 10)
load_timeout_secs = {}

[thermal]
; Seconds between thermal samples, clamped to 2-5 (default: 3)
sample_interval_secs = {}
; Severity (0.0-1.0) above which quality steps down (default: 0.8)
escalate_threshold = {}
; Severity (0.0-1.0) below which quality steps back up (default: 0.4)
restore_threshold = {}
; Consecutive samples past a threshold before the tier changes (default: 2)
consecutive_samples = {}
; Cool samples at a forced quality ceiling before full quality may return (default: 10)
episode_clear_samples = {}

[recovery]
; Automatic retries allowed per failure kind within the window (default: 3)
max_attempts = {}
; Sliding window for counting retries, in seconds (default: 30)
window_secs = {}
; Delay before each retry, in seconds; the last value repeats (default: 1, 3, 8)
backoff_secs = {}
; Number of recent failures kept for diagnostics (default: 32)
history_size = {}

[lod]
; Per-tier rendering multipliers relative to the source asset
{}{}{}
[logging]
; Log file path
file = {}

[preferences]
; Preference store holding ar_enabled
file = {}
"#,
        format_size(config.cache.budget),
        config.cache.load_timeout_secs,
        config.thermal.sample_interval_secs,
        config.thermal.escalate_threshold,
        config.thermal.restore_threshold,
        config.thermal.consecutive_samples,
        config.thermal.episode_clear_samples,
        config.recovery.max_attempts,
        config.recovery.window_secs,
        backoff,
        config.recovery.history_size,
        lod_lines("low", &config.lod.low),
        lod_lines("medium", &config.lod.medium),
        lod_lines("high", &config.lod.high),
        config.logging.file.display(),
        config.preferences.file.display(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ini::Ini;

    #[test]
    fn test_output_is_valid_ini() {
        let content = to_config_string(&ConfigFile::default());
        let ini = Ini::load_from_str(&content).unwrap();

        let cache = ini.section(Some("cache")).unwrap();
        assert_eq!(cache.get("budget"), Some("256MB"));
        let recovery = ini.section(Some("recovery")).unwrap();
        assert_eq!(recovery.get("backoff_secs"), Some("1, 3, 8"));
        let lod = ini.section(Some("lod")).unwrap();
        assert_eq!(lod.get("texture_scale_medium"), Some("0.5"));
    }
}
