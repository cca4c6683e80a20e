//! Failure taxonomy and failure events.

use std::fmt;
use std::time::Instant;

use serde::Serialize;

use crate::asset::{CacheError, LoadError};
use crate::session::SessionState;
use crate::thermal::SignalError;

/// Class of a failure, used to select the fallback response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Device or OS cannot run AR.
    CapabilityUnsupported,
    /// Camera/AR permission denied.
    PermissionDenied,
    /// An asset load exceeded its timeout.
    LoadTimeout,
    /// The asset loader failed.
    LoadError,
    /// The device ran out of memory or similar resources.
    ResourceExhausted,
    /// The renderer could not hold its frame budget.
    RenderBudgetExceeded,
    /// The asset cache could not make room for a record.
    BudgetExceeded,
    /// The thermal signal could not be read.
    SignalUnavailable,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::CapabilityUnsupported => "capability_unsupported",
            FailureKind::PermissionDenied => "permission_denied",
            FailureKind::LoadTimeout => "load_timeout",
            FailureKind::LoadError => "load_error",
            FailureKind::ResourceExhausted => "resource_exhausted",
            FailureKind::RenderBudgetExceeded => "render_budget_exceeded",
            FailureKind::BudgetExceeded => "budget_exceeded",
            FailureKind::SignalUnavailable => "signal_unavailable",
        }
    }

    /// Whether a failure of this kind is worth retrying when nothing more
    /// specific is known.
    pub fn default_transient(&self) -> bool {
        matches!(self, FailureKind::LoadTimeout | FailureKind::LoadError)
    }

    /// Classify a cache error.
    ///
    /// Returns `None` for gate refusals (`Suspended`, `Closed`), which are
    /// session state rather than failures.
    pub fn from_cache_error(error: &CacheError) -> Option<Self> {
        match error {
            CacheError::Load {
                source: LoadError::OutOfMemory,
                ..
            } => Some(FailureKind::ResourceExhausted),
            CacheError::Load { .. } | CacheError::LoadAborted { .. } => {
                Some(FailureKind::LoadError)
            }
            CacheError::NotResident { .. } => Some(FailureKind::LoadError),
            CacheError::LoadTimeout { .. } => Some(FailureKind::LoadTimeout),
            CacheError::BudgetExceeded { .. } => Some(FailureKind::BudgetExceeded),
            CacheError::Suspended | CacheError::Closed => None,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failure, as reported to the fallback policy.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureEvent {
    pub kind: FailureKind,
    /// Session state when the failure occurred.
    pub session_state: SessionState,
    pub timestamp: Instant,
    pub transient: bool,
    /// Asset identifier the failed operation was for, if any.
    pub subject: Option<String>,
    /// Human-readable description.
    pub detail: String,
}

impl FailureEvent {
    /// Event stamped now, with the kind's default transience.
    pub fn new(kind: FailureKind, session_state: SessionState) -> Self {
        Self {
            kind,
            session_state,
            timestamp: Instant::now(),
            transient: kind.default_transient(),
            subject: None,
            detail: kind.to_string(),
        }
    }

    /// Event describing a cache error, or `None` for gate refusals.
    ///
    /// A loader `NotFound` is never transient: retrying will not make the
    /// asset appear. A failed `degrade` is not transient either.
    pub fn from_cache_error(error: &CacheError, session_state: SessionState) -> Option<Self> {
        let kind = FailureKind::from_cache_error(error)?;
        let transient = match error {
            CacheError::Load {
                source: LoadError::NotFound(_),
                ..
            }
            | CacheError::NotResident { .. } => false,
            _ => kind.default_transient(),
        };
        let subject = match error {
            CacheError::NotResident { identifier } => Some(identifier.clone()),
            other => other.key().map(|key| key.identifier.clone()),
        };

        Some(Self {
            transient,
            subject,
            detail: error.to_string(),
            ..Self::new(kind, session_state)
        })
    }

    pub fn from_signal_error(error: &SignalError, session_state: SessionState) -> Self {
        Self::new(FailureKind::SignalUnavailable, session_state).with_detail(error.to_string())
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    pub fn with_transient(mut self, transient: bool) -> Self {
        self.transient = transient;
        self
    }

    pub fn at(mut self, timestamp: Instant) -> Self {
        self.timestamp = timestamp;
        self
    }
}
