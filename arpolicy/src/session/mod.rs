//! AR session lifecycle.

mod capability;
mod lifecycle;
mod state;

pub use capability::{CapabilityProbe, CapabilityStatus, StaticCapability};
pub use lifecycle::{SessionError, SessionLifecycle, SessionTransition};
pub use state::{SessionEvent, SessionState};
