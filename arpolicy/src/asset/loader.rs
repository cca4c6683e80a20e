//! Asset loader collaborator boundary.
//!
//! The loader is external I/O: it turns an identifier and tier into an opaque
//! payload. The cache wraps every call in a timeout and never retries on its
//! own; retry decisions belong to the fallback policy.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use super::types::{AssetRecord, LoadedAsset};
use crate::quality::{LodProfile, QualityTier};

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors reported by an [`AssetLoader`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    /// No asset exists for the identifier/tier.
    #[error("Asset not found: {0}")]
    NotFound(String),

    /// Reading the asset source failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// The asset data could not be decoded into a payload.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The platform could not allocate the payload.
    #[error("Out of memory while loading asset")]
    OutOfMemory,
}

/// Loads 3D assets at a requested LOD tier.
///
/// Implementations must be `Send + Sync`; loads for unrelated keys run
/// concurrently on the Tokio runtime.
pub trait AssetLoader: Send + Sync + 'static {
    /// Load `identifier` at `tier`.
    fn load(&self, identifier: &str, tier: QualityTier)
        -> BoxFuture<'_, Result<LoadedAsset, LoadError>>;

    /// Synchronously derive a lower-tier variant from a resident record.
    ///
    /// The default shares the source payload and rescales the byte estimate
    /// with `lod`. Platforms that can decimate meshes should override it.
    fn downgrade(
        &self,
        source: &AssetRecord,
        target: QualityTier,
        lod: &LodProfile,
    ) -> Result<LoadedAsset, LoadError> {
        Ok(LoadedAsset::new(
            source.payload().clone(),
            lod.rescale_bytes(source.estimated_bytes(), source.tier(), target),
        ))
    }
}
