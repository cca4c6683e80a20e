//! Application error types.

use std::fmt;

use crate::preferences::PreferenceError;
use crate::session::SessionError;

/// Errors that can occur during application lifecycle.
#[derive(Debug)]
pub enum AppError {
    /// Configuration error.
    Config(String),

    /// Reading or writing the `ar_enabled` preference failed.
    Preferences(PreferenceError),

    /// The session rejected a lifecycle event.
    Session(SessionError),

    /// No AR session exists (AR disabled or not started).
    NoSession,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            AppError::Preferences(e) => {
                write!(f, "Preference store error: {}", e)
            }
            AppError::Session(e) => {
                write!(f, "Session error: {}", e)
            }
            AppError::NoSession => {
                write!(f, "No AR session")
            }
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Preferences(e) => Some(e),
            AppError::Session(e) => Some(e),
            AppError::Config(_) | AppError::NoSession => None,
        }
    }
}

impl From<PreferenceError> for AppError {
    fn from(e: PreferenceError) -> Self {
        AppError::Preferences(e)
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        AppError::Session(e)
    }
}
