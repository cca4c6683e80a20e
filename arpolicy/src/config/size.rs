//! Human-readable byte sizes ("256MB", "1GB").

use thiserror::Error;

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;

/// Error parsing a size string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid size '{input}' - expected format like '256MB', '1GB', or '512KB'")]
pub struct SizeParseError {
    input: String,
}

/// Parse a size string into bytes.
///
/// Accepts a bare byte count or a `K`/`KB`, `M`/`MB`, `G`/`GB` suffix
/// (binary multiples, case-insensitive, whitespace tolerant).
///
/// ```
/// use arpolicy::config::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("256 MB").unwrap(), 256 * 1024 * 1024);
/// assert_eq!(parse_size("1g").unwrap(), 1024 * 1024 * 1024);
/// ```
pub fn parse_size(s: &str) -> Result<u64, SizeParseError> {
    let invalid = || SizeParseError {
        input: s.to_string(),
    };
    let trimmed = s.trim();

    let (digits, multiplier) = [("GB", GB), ("G", GB), ("MB", MB), ("M", MB), ("KB", KB), ("K", KB)]
        .into_iter()
        .find_map(|(suffix, multiplier)| {
            let start = trimmed.len().checked_sub(suffix.len())?;
            let tail = trimmed.get(start..)?;
            tail.eq_ignore_ascii_case(suffix)
                .then(|| (&trimmed[..start], multiplier))
        })
        .unwrap_or((trimmed, 1));

    let number: u64 = digits.trim().parse().map_err(|_| invalid())?;
    number.checked_mul(multiplier).ok_or_else(invalid)
}

/// Format bytes with the largest suffix that divides them exactly.
///
/// ```
/// use arpolicy::config::format_size;
///
/// assert_eq!(format_size(256 * 1024 * 1024), "256MB");
/// assert_eq!(format_size(1500), "1500");
/// ```
pub fn format_size(bytes: u64) -> String {
    if bytes >= GB && bytes % GB == 0 {
        format!("{}GB", bytes / GB)
    } else if bytes >= MB && bytes % MB == 0 {
        format!("{}MB", bytes / MB)
    } else if bytes >= KB && bytes % KB == 0 {
        format!("{}KB", bytes / KB)
    } else {
        bytes.to_string()
    }
}
