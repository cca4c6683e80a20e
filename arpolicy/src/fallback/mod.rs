//! Failure classification and fallback responses.
//!
//! Components never decide on recovery themselves. They turn their errors
//! into [`FailureEvent`]s and hand them to [`FallbackPolicy::handle`].

mod failure;
mod policy;
mod retry;

pub use failure::{FailureEvent, FailureKind};
pub use policy::{FallbackAction, FallbackDecision, FallbackPolicy};
pub use retry::{
    RecoveryConfig, RetryBudget, RetryGrant, DEFAULT_BACKOFF_SECS, DEFAULT_HISTORY_SIZE,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_WINDOW,
};
