//! Device AR capability probe boundary.

use crate::asset::BoxFuture;

/// Outcome of probing the device for AR support.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityStatus {
    /// The AR runtime is available and permitted.
    Supported,
    /// The device or OS cannot run AR.
    Unsupported(String),
    /// The user denied camera/AR permission.
    PermissionDenied,
}

/// Platform hook that answers whether AR can run.
pub trait CapabilityProbe: Send + Sync {
    fn probe(&self) -> BoxFuture<'_, CapabilityStatus>;
}

/// Probe with a fixed answer, for hosts that determine capability elsewhere.
#[derive(Debug, Clone)]
pub struct StaticCapability(pub CapabilityStatus);

impl CapabilityProbe for StaticCapability {
    fn probe(&self) -> BoxFuture<'_, CapabilityStatus> {
        let status = self.0.clone();
        Box::pin(async move { status })
    }
}
