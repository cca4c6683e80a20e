//! Asset identity and resident record types.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::quality::QualityTier;

/// Cache key: one asset at one LOD tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetKey {
    /// Stable asset identifier (the mapped object id).
    pub identifier: String,
    /// LOD tier of this variant.
    pub tier: QualityTier,
}

impl AssetKey {
    pub fn new(identifier: impl Into<String>, tier: QualityTier) -> Self {
        Self {
            identifier: identifier.into(),
            tier,
        }
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.identifier, self.tier)
    }
}

/// Opaque platform mesh/texture handle.
///
/// The cache never inspects the payload. Renderers recover their concrete
/// type with [`downcast_ref`](Self::downcast_ref).
#[derive(Clone)]
pub struct PayloadHandle(Arc<dyn Any + Send + Sync>);

impl PayloadHandle {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// True when both handles refer to the same platform resource.
    pub fn ptr_eq(&self, other: &PayloadHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for PayloadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PayloadHandle(..)")
    }
}

/// Output of the asset loader before it becomes a resident record.
#[derive(Debug, Clone)]
pub struct LoadedAsset {
    pub payload: PayloadHandle,
    pub estimated_bytes: u64,
}

impl LoadedAsset {
    pub fn new(payload: PayloadHandle, estimated_bytes: u64) -> Self {
        Self {
            payload,
            estimated_bytes,
        }
    }
}

/// One loaded 3D model at a specific LOD.
///
/// Records are immutable. A LOD transition produces a new record and the old
/// one is released. Access recency is tracked by the cache, not the record.
#[derive(Debug)]
pub struct AssetRecord {
    key: AssetKey,
    payload: PayloadHandle,
    estimated_bytes: u64,
    loaded_at: Instant,
    generation: u64,
}

impl AssetRecord {
    pub(crate) fn new(key: AssetKey, loaded: LoadedAsset, generation: u64) -> Self {
        Self {
            key,
            payload: loaded.payload,
            estimated_bytes: loaded.estimated_bytes,
            loaded_at: Instant::now(),
            generation,
        }
    }

    pub fn key(&self) -> &AssetKey {
        &self.key
    }

    pub fn identifier(&self) -> &str {
        &self.key.identifier
    }

    pub fn tier(&self) -> QualityTier {
        self.key.tier
    }

    pub fn payload(&self) -> &PayloadHandle {
        &self.payload
    }

    pub fn estimated_bytes(&self) -> u64 {
        self.estimated_bytes
    }

    pub fn loaded_at(&self) -> Instant {
        self.loaded_at
    }

    /// Monotonic id assigned when the record was created.
    ///
    /// Two lookups returning the same generation saw the same load.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
