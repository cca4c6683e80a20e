//! Keyed cache of 3D assets with LOD variants.
//!
//! [`AssetCache`] owns every resident [`AssetRecord`] and the memory budget
//! they are accounted against. Loads go through an external [`AssetLoader`]
//! and are coalesced per `(identifier, tier)` key.

mod cache;
mod error;
mod loader;
mod stats;
mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::{
    AssetCache, CacheConfig, CacheGate, DEFAULT_CACHE_BUDGET_BYTES, DEFAULT_LOAD_TIMEOUT,
};
pub use error::CacheError;
pub use loader::{AssetLoader, BoxFuture, LoadError};
pub use stats::CacheStats;
pub use types::{AssetKey, AssetRecord, LoadedAsset, PayloadHandle};
