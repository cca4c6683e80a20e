//! Session states and the transition table.

use std::fmt;

use serde::Serialize;

/// State of one AR session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, capability not yet checked.
    Uninitialized,
    /// Capability check in progress.
    Checking,
    /// Device cannot run AR for this session. Terminal.
    Unsupported,
    /// Capability confirmed, not started.
    Ready,
    /// Running: resolves accepted, thermal sampling on.
    Active,
    /// Backgrounded: resolves refused, sampling off.
    Suspended,
    /// Torn down. Terminal.
    Disposed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Checking => "checking",
            SessionState::Unsupported => "unsupported",
            SessionState::Ready => "ready",
            SessionState::Active => "active",
            SessionState::Suspended => "suspended",
            SessionState::Disposed => "disposed",
        }
    }

    /// `Unsupported` and `Disposed` end the session instance.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Unsupported | SessionState::Disposed)
    }

    /// State reached by applying `event`, or `None` if the transition is
    /// not allowed.
    pub fn next(self, event: SessionEvent) -> Option<SessionState> {
        use SessionEvent as E;
        use SessionState as S;

        match (self, event) {
            (S::Disposed, _) => None,
            (_, E::Dispose) => Some(S::Disposed),
            (S::Uninitialized, E::Check) => Some(S::Checking),
            (S::Checking, E::CapabilityFound) => Some(S::Ready),
            (S::Checking, E::CapabilityAbsent) => Some(S::Unsupported),
            (S::Ready, E::Start) => Some(S::Active),
            (S::Active, E::Backgrounded) => Some(S::Suspended),
            (S::Suspended, E::Foregrounded) => Some(S::Active),
            (S::Active | S::Suspended, E::FatalFailure) => Some(S::Unsupported),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    Check,
    CapabilityFound,
    CapabilityAbsent,
    Start,
    Backgrounded,
    Foregrounded,
    FatalFailure,
    Dispose,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionEvent::Check => "check",
            SessionEvent::CapabilityFound => "capability_found",
            SessionEvent::CapabilityAbsent => "capability_absent",
            SessionEvent::Start => "start",
            SessionEvent::Backgrounded => "backgrounded",
            SessionEvent::Foregrounded => "foregrounded",
            SessionEvent::FatalFailure => "fatal_failure",
            SessionEvent::Dispose => "dispose",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [SessionState; 7] = [
        SessionState::Uninitialized,
        SessionState::Checking,
        SessionState::Unsupported,
        SessionState::Ready,
        SessionState::Active,
        SessionState::Suspended,
        SessionState::Disposed,
    ];

    const ALL_EVENTS: [SessionEvent; 8] = [
        SessionEvent::Check,
        SessionEvent::CapabilityFound,
        SessionEvent::CapabilityAbsent,
        SessionEvent::Start,
        SessionEvent::Backgrounded,
        SessionEvent::Foregrounded,
        SessionEvent::FatalFailure,
        SessionEvent::Dispose,
    ];

    #[test]
    fn test_happy_path() {
        let state = SessionState::Uninitialized
            .next(SessionEvent::Check)
            .and_then(|s| s.next(SessionEvent::CapabilityFound))
            .and_then(|s| s.next(SessionEvent::Start))
            .and_then(|s| s.next(SessionEvent::Backgrounded))
            .and_then(|s| s.next(SessionEvent::Foregrounded));
        assert_eq!(state, Some(SessionState::Active));
    }

    #[test]
    fn test_disposed_is_absorbing() {
        for event in ALL_EVENTS {
            assert_eq!(SessionState::Disposed.next(event), None);
        }
    }

    #[test]
    fn test_dispose_from_any_live_state() {
        for state in ALL_STATES.into_iter().filter(|s| *s != SessionState::Disposed) {
            assert_eq!(state.next(SessionEvent::Dispose), Some(SessionState::Disposed));
        }
    }

    #[test]
    fn test_unsupported_only_from_checking_or_fatal_failure() {
        for state in ALL_STATES {
            for event in ALL_EVENTS {
                if state.next(event) == Some(SessionState::Unsupported) {
                    assert!(
                        matches!(
                            (state, event),
                            (SessionState::Checking, SessionEvent::CapabilityAbsent)
                                | (SessionState::Active, SessionEvent::FatalFailure)
                                | (SessionState::Suspended, SessionEvent::FatalFailure)
                        ),
                        "{state} --{event}--> unsupported"
                    );
                }
            }
        }
        assert_eq!(SessionState::Ready.next(SessionEvent::FatalFailure), None);
    }

    #[test]
    fn test_unsupported_only_leaves_via_dispose() {
        for event in ALL_EVENTS {
            let next = SessionState::Unsupported.next(event);
            if event == SessionEvent::Dispose {
                assert_eq!(next, Some(SessionState::Disposed));
            } else {
                assert_eq!(next, None);
            }
        }
    }
}
