//! AR session lifecycle controller.
//!
//! # State Machine
//!
//! ```text
//! Uninitialized --check()--> Checking
//! Checking --capability_found--> Ready
//! Checking --capability_absent--> Unsupported
//! Ready --start()--> Active
//! Active --backgrounded--> Suspended
//! Suspended --foregrounded--> Active
//! Active|Suspended --fatal_failure--> Unsupported
//! Any --dispose()--> Disposed
//! ```
//!
//! Entering a state gates the asset cache and thermal controller:
//!
//! | entered       | cache   | thermal sampling |
//! |---------------|---------|------------------|
//! | `Active`      | open    | on               |
//! | `Suspended`   | paused  | off              |
//! | `Unsupported` | paused  | off              |
//! | `Disposed`    | cleared | off              |
//!
//! Both components are constructed paused, so nothing loads or samples
//! before a session first reaches `Active`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::capability::{CapabilityProbe, CapabilityStatus};
use super::state::{SessionEvent, SessionState};
use crate::asset::AssetCache;
use crate::events::{SubscriptionId, Subscribers};
use crate::thermal::ThermalQualityController;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Session state machine errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The event is not valid in the current state.
    #[error("Invalid session transition: {event} while {from}")]
    InvalidTransition {
        from: SessionState,
        event: SessionEvent,
    },
}

/// One committed state change, delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTransition {
    pub session_id: u64,
    pub from: SessionState,
    pub to: SessionState,
    pub event: SessionEvent,
}

/// Finite-state controller for one AR session.
///
/// A session that reaches `Unsupported` or `Disposed` is finished; build a
/// new one with [`SessionLifecycle::new`] to try again.
pub struct SessionLifecycle {
    id: u64,
    state: Mutex<SessionState>,
    cache: Arc<AssetCache>,
    thermal: Arc<ThermalQualityController>,
    subscribers: Subscribers<SessionTransition>,
}

impl std::fmt::Debug for SessionLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLifecycle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SessionLifecycle {
    pub fn new(cache: Arc<AssetCache>, thermal: Arc<ThermalQualityController>) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(SessionState::Uninitialized),
            cache,
            thermal,
            subscribers: Subscribers::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Begin the capability check.
    pub fn check(&self) -> Result<(), SessionError> {
        self.apply(SessionEvent::Check).map(|_| ())
    }

    pub fn capability_found(&self) -> Result<(), SessionError> {
        self.apply(SessionEvent::CapabilityFound).map(|_| ())
    }

    pub fn capability_absent(&self, reason: &str) -> Result<(), SessionError> {
        warn!(session = self.id, reason, "AR capability absent");
        self.apply(SessionEvent::CapabilityAbsent).map(|_| ())
    }

    /// Run [`check`](Self::check) and resolve it with `probe`.
    ///
    /// Returns the probe result so callers can report why a session ended up
    /// `Unsupported`.
    pub async fn run_check(
        &self,
        probe: &dyn CapabilityProbe,
    ) -> Result<CapabilityStatus, SessionError> {
        self.check()?;
        let status = probe.probe().await;
        match &status {
            CapabilityStatus::Supported => self.capability_found()?,
            CapabilityStatus::Unsupported(reason) => self.capability_absent(reason)?,
            CapabilityStatus::PermissionDenied => self.capability_absent("permission denied")?,
        }
        Ok(status)
    }

    pub fn start(&self) -> Result<(), SessionError> {
        self.apply(SessionEvent::Start).map(|_| ())
    }

    pub fn backgrounded(&self) -> Result<(), SessionError> {
        self.apply(SessionEvent::Backgrounded).map(|_| ())
    }

    pub fn foregrounded(&self) -> Result<(), SessionError> {
        self.apply(SessionEvent::Foregrounded).map(|_| ())
    }

    /// Non-recoverable failure while running.
    pub fn fatal_failure(&self, reason: &str) -> Result<(), SessionError> {
        warn!(session = self.id, reason, "Fatal AR session failure");
        self.apply(SessionEvent::FatalFailure).map(|_| ())
    }

    /// Tear the session down. Idempotent.
    pub fn dispose(&self) {
        if self.state() == SessionState::Disposed {
            return;
        }
        // Dispose is valid from every non-disposed state; a concurrent
        // dispose winning the race is the only way this can fail.
        if let Err(e) = self.apply(SessionEvent::Dispose) {
            debug!(session = self.id, error = %e, "Session already disposed");
        }
    }

    fn apply(&self, event: SessionEvent) -> Result<SessionTransition, SessionError> {
        let transition = {
            let mut state = self.state.lock();
            let from = *state;
            let to = from
                .next(event)
                .ok_or(SessionError::InvalidTransition { from, event })?;
            *state = to;
            self.enter(to);
            SessionTransition {
                session_id: self.id,
                from,
                to,
                event,
            }
        };

        info!(
            session = self.id,
            from = %transition.from,
            to = %transition.to,
            event = %event,
            "Session transition"
        );
        self.subscribers.publish(&transition);
        Ok(transition)
    }

    fn enter(&self, state: SessionState) {
        match state {
            SessionState::Active => {
                self.cache.resume();
                self.thermal.resume();
            }
            SessionState::Suspended | SessionState::Unsupported => {
                self.cache.pause();
                self.thermal.pause();
            }
            SessionState::Disposed => {
                self.cache.close();
                self.thermal.pause();
            }
            SessionState::Uninitialized | SessionState::Checking | SessionState::Ready => {}
        }
    }

    // =========================================================================
    // Observation
    // =========================================================================

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&SessionTransition) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }
}
