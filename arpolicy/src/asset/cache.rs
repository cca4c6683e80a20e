//! Budgeted LOD asset cache with coalesced loads.
//!
//! # Architecture
//!
//! ```text
//! resolve(A@high) ─┐
//!                  │  miss    ┌────────────┐   load    ┌────────┐
//! resolve(A@high) ─┼────────► │ in_flight  │ ────────► │ loader │
//!                  │          │ (per key)  │           └────────┘
//! resolve(A@high) ─┘          └─────┬──────┘               │
//!                                   │ broadcast            ▼
//!                  all callers ◄────┘             insert + evict (LRU)
//! ```
//!
//! Each load runs as its own Tokio task. Callers only hold a broadcast
//! receiver, so dropping a caller never cancels the load: the task still
//! inserts the record for whoever asks next.
//!
//! # Locking
//!
//! - `in_flight` is a `DashMap`; its per-shard lock serializes the
//!   miss → register decision for one key without blocking unrelated keys.
//! - `state` (records + budget counter) is a short `parking_lot` critical
//!   section, never held across an await. Eviction and insertion happen in
//!   the same critical section.
//! - Lock order is always `in_flight` shard, then `state`.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry as InFlightEntry;
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::error::CacheError;
use super::loader::AssetLoader;
use super::stats::{CacheCounters, CacheStats};
use super::types::{AssetKey, AssetRecord, LoadedAsset};
use crate::quality::{LodProfile, QualityTier, SharedTier};

/// Default cache budget (256 MB).
pub const DEFAULT_CACHE_BUDGET_BYTES: u64 = 256 * 1024 * 1024;

/// Default timeout for a single load (10 seconds).
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Asset cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Soft cap on aggregate estimated bytes of resident records.
    pub budget_bytes: u64,
    /// Bound on a single loader call.
    pub load_timeout: Duration,
    /// Per-tier LOD settings used by `degrade`.
    pub lod: LodProfile,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            budget_bytes: DEFAULT_CACHE_BUDGET_BYTES,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            lod: LodProfile::default(),
        }
    }
}

impl CacheConfig {
    pub fn with_budget(mut self, budget_bytes: u64) -> Self {
        self.budget_bytes = budget_bytes;
        self
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }
}

/// Whether the cache accepts new work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheGate {
    /// Normal operation.
    Open,
    /// New resolves rejected; in-flight loads still complete and insert.
    Paused,
    /// Cleared on disposal; new resolves rejected and late loads dropped.
    Closed,
}

impl CacheGate {
    fn to_u8(self) -> u8 {
        match self {
            CacheGate::Open => 0,
            CacheGate::Paused => 1,
            CacheGate::Closed => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => CacheGate::Open,
            1 => CacheGate::Paused,
            _ => CacheGate::Closed,
        }
    }
}

type LoadOutcome = Result<Arc<AssetRecord>, CacheError>;

#[derive(Debug)]
struct Entry {
    record: Arc<AssetRecord>,
    last_access: Instant,
    recency: u64,
    pins: u32,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<AssetKey, Entry>,
    used_bytes: u64,
    tick: u64,
}

impl CacheState {
    fn touch(&mut self, key: &AssetKey) -> Option<Arc<AssetRecord>> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(key).map(|entry| {
            entry.recency = tick;
            entry.last_access = Instant::now();
            Arc::clone(&entry.record)
        })
    }

    fn insert(&mut self, record: Arc<AssetRecord>, pins: u32) -> Arc<AssetRecord> {
        self.tick += 1;
        self.used_bytes += record.estimated_bytes();
        self.entries.insert(
            record.key().clone(),
            Entry {
                record: Arc::clone(&record),
                last_access: Instant::now(),
                recency: self.tick,
                pins,
            },
        );
        record
    }

    fn remove(&mut self, key: &AssetKey) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.used_bytes = self.used_bytes.saturating_sub(entry.record.estimated_bytes());
        Some(entry)
    }

    /// Highest resident tier of `identifier` that is at most `ceiling`.
    fn best_at_or_below(&self, identifier: &str, ceiling: QualityTier) -> Option<AssetKey> {
        QualityTier::ALL
            .iter()
            .rev()
            .filter(|tier| **tier <= ceiling)
            .map(|tier| AssetKey::new(identifier, *tier))
            .find(|key| self.entries.contains_key(key))
    }
}

/// Keyed store of loaded 3D assets with LOD variants.
///
/// Share it as `Arc<AssetCache>`; `resolve` needs the `Arc` to spawn load
/// tasks that outlive any single caller.
pub struct AssetCache {
    config: CacheConfig,
    loader: Arc<dyn AssetLoader>,
    tier: SharedTier,
    state: Mutex<CacheState>,
    in_flight: DashMap<AssetKey, broadcast::Sender<LoadOutcome>>,
    gate: AtomicU8,
    generation: AtomicU64,
    counters: CacheCounters,
}

impl std::fmt::Debug for AssetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetCache")
            .field("config", &self.config)
            .field("gate", &self.gate())
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl AssetCache {
    /// Create a paused cache reading the current tier from `tier`.
    ///
    /// Resolves fail with [`CacheError::Suspended`] until [`resume`](Self::resume).
    pub fn new(config: CacheConfig, loader: Arc<dyn AssetLoader>, tier: SharedTier) -> Self {
        Self {
            config,
            loader,
            tier,
            state: Mutex::new(CacheState::default()),
            in_flight: DashMap::new(),
            gate: AtomicU8::new(CacheGate::Paused.to_u8()),
            generation: AtomicU64::new(1),
            counters: CacheCounters::default(),
        }
    }

    // =========================================================================
    // Resolve
    // =========================================================================

    /// Resolve `identifier` at the current quality tier.
    pub async fn resolve_current(
        self: &Arc<Self>,
        identifier: &str,
    ) -> Result<Arc<AssetRecord>, CacheError> {
        self.resolve(identifier, self.tier.get()).await
    }

    /// Return the resident record for `(identifier, tier)`, loading it if
    /// needed.
    ///
    /// Concurrent calls for the same key share one load. Dropping the
    /// returned future only drops this caller; the load still completes and
    /// populates the cache.
    pub async fn resolve(
        self: &Arc<Self>,
        identifier: &str,
        tier: QualityTier,
    ) -> Result<Arc<AssetRecord>, CacheError> {
        self.check_accepting()?;
        let key = AssetKey::new(identifier, tier);

        if let Some(record) = self.lookup(&key) {
            CacheCounters::bump(&self.counters.hits);
            return Ok(record);
        }

        let mut rx = match self.in_flight.entry(key.clone()) {
            InFlightEntry::Occupied(entry) => {
                CacheCounters::bump(&self.counters.coalesced);
                debug!(key = %key, "Joining in-flight load");
                entry.get().subscribe()
            }
            InFlightEntry::Vacant(entry) => {
                // A load may have completed between the first lookup and
                // taking the shard lock.
                if let Some(record) = self.lookup(&key) {
                    CacheCounters::bump(&self.counters.hits);
                    return Ok(record);
                }
                CacheCounters::bump(&self.counters.misses);
                let (tx, rx) = broadcast::channel(1);
                entry.insert(tx);
                self.spawn_load(key.clone());
                rx
            }
        };

        match rx.recv().await {
            Ok(outcome) => outcome,
            Err(_) => Err(CacheError::LoadAborted { key }),
        }
    }

    fn spawn_load(self: &Arc<Self>, key: AssetKey) {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(cache.load_and_insert(&key))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    warn!(key = %key, "Asset loader panicked");
                    Err(CacheError::LoadAborted { key: key.clone() })
                });

            // The record (if any) is already resident, so callers arriving
            // after this removal hit instead of starting a second load.
            if let Some((_, tx)) = cache.in_flight.remove(&key) {
                let waiters = tx.receiver_count();
                let _ = tx.send(outcome);
                debug!(key = %key, waiters, "Load result delivered");
            }
        });
    }

    async fn load_and_insert(&self, key: &AssetKey) -> LoadOutcome {
        CacheCounters::bump(&self.counters.loads);
        let started = Instant::now();
        let timeout = self.config.load_timeout;

        let loaded = match tokio::time::timeout(timeout, self.loader.load(&key.identifier, key.tier))
            .await
        {
            Ok(Ok(loaded)) => loaded,
            Ok(Err(source)) => {
                warn!(key = %key, error = %source, "Asset load failed");
                return Err(CacheError::Load {
                    key: key.clone(),
                    source,
                });
            }
            Err(_) => {
                warn!(key = %key, timeout_ms = timeout.as_millis() as u64, "Asset load timed out");
                return Err(CacheError::LoadTimeout {
                    key: key.clone(),
                    timeout,
                });
            }
        };

        debug!(
            key = %key,
            bytes = loaded.estimated_bytes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Asset loaded"
        );
        self.insert(key.clone(), loaded)
    }

    // =========================================================================
    // Insertion and eviction
    // =========================================================================

    /// Insert a freshly loaded asset, evicting LRU records to stay within
    /// budget.
    fn insert(&self, key: AssetKey, loaded: LoadedAsset) -> LoadOutcome {
        if self.gate() == CacheGate::Closed {
            debug!(key = %key, "Dropping load result, cache closed");
            return Err(CacheError::Closed);
        }

        let record = Arc::new(AssetRecord::new(key, loaded, self.next_generation()));
        let mut state = self.state.lock();
        if let Some(existing) = state.touch(record.key()) {
            return Ok(existing);
        }
        self.make_room(&mut state, record.key(), record.estimated_bytes())?;
        Ok(state.insert(record, 0))
    }

    /// Evict least-recently-used unpinned records until `required` more bytes
    /// fit. Nothing is evicted when the budget cannot be met.
    fn make_room(
        &self,
        state: &mut CacheState,
        key: &AssetKey,
        required: u64,
    ) -> Result<(), CacheError> {
        let budget = self.config.budget_bytes;
        if state.used_bytes + required <= budget {
            return Ok(());
        }

        let evictable: u64 = state
            .entries
            .iter()
            .filter(|(k, e)| e.pins == 0 && *k != key)
            .map(|(_, e)| e.record.estimated_bytes())
            .sum();
        let floor = state.used_bytes - evictable;
        if floor + required > budget {
            CacheCounters::bump(&self.counters.rejected);
            warn!(
                key = %key,
                required,
                pinned_bytes = floor,
                budget,
                "Cache budget exceeded"
            );
            return Err(CacheError::BudgetExceeded {
                key: key.clone(),
                required,
                available: budget.saturating_sub(floor),
            });
        }

        let mut candidates: Vec<(u64, AssetKey)> = state
            .entries
            .iter()
            .filter(|(k, e)| e.pins == 0 && *k != key)
            .map(|(k, e)| (e.recency, k.clone()))
            .collect();
        candidates.sort_unstable();

        for (_, victim) in candidates {
            if state.used_bytes + required <= budget {
                break;
            }
            if let Some(entry) = state.remove(&victim) {
                CacheCounters::bump(&self.counters.evictions);
                debug!(
                    key = %victim,
                    bytes = entry.record.estimated_bytes(),
                    "Evicted asset"
                );
            }
        }
        Ok(())
    }

    // =========================================================================
    // Degradation and release
    // =========================================================================

    /// Replace the highest Medium/High record of `identifier` with its
    /// next-lower tier.
    ///
    /// Pins move to the new record. If the lower tier is already resident it
    /// is reused.
    pub fn degrade(&self, identifier: &str) -> Result<Arc<AssetRecord>, CacheError> {
        let source = {
            let state = self.state.lock();
            [QualityTier::High, QualityTier::Medium]
                .iter()
                .map(|tier| AssetKey::new(identifier, *tier))
                .find_map(|key| state.entries.get(&key).map(|e| Arc::clone(&e.record)))
        }
        .ok_or_else(|| CacheError::NotResident {
            identifier: identifier.to_string(),
        })?;

        let target = source.tier().lower_clamped();
        let target_key = AssetKey::new(identifier, target);
        let loaded = self
            .loader
            .downgrade(&source, target, &self.config.lod)
            .map_err(|source| CacheError::Load {
                key: target_key.clone(),
                source,
            })?;

        let mut state = self.state.lock();
        let removed = state.remove(source.key());
        let pins = removed.as_ref().map_or(0, |e| e.pins);

        if state.entries.contains_key(&target_key) {
            if let Some(entry) = state.entries.get_mut(&target_key) {
                entry.pins += pins;
            }
            info!(from = %source.key(), to = %target, "Degraded to resident tier");
            return state.touch(&target_key).ok_or(CacheError::NotResident {
                identifier: identifier.to_string(),
            });
        }

        if let Err(e) = self.make_room(&mut state, &target_key, loaded.estimated_bytes) {
            // make_room evicts nothing on failure, so putting the source back
            // leaves the cache as it was.
            if let Some(entry) = removed {
                state.used_bytes += entry.record.estimated_bytes();
                state.entries.insert(entry.record.key().clone(), entry);
            }
            return Err(e);
        }
        let record = Arc::new(AssetRecord::new(target_key, loaded, self.next_generation()));
        info!(
            from = %source.key(),
            to = %target,
            freed = source.estimated_bytes().saturating_sub(record.estimated_bytes()),
            "Degraded asset"
        );
        Ok(state.insert(record, pins))
    }

    /// Unpin every tier of `identifier` and move them to the front of the
    /// eviction order. Returns the number of records affected.
    pub fn release(&self, identifier: &str) -> usize {
        let mut state = self.state.lock();
        let mut released = 0;
        for entry in state
            .entries
            .iter_mut()
            .filter(|(key, _)| key.identifier == identifier)
            .map(|(_, entry)| entry)
        {
            entry.pins = 0;
            entry.recency = 0;
            released += 1;
        }
        if released > 0 {
            debug!(identifier, released, "Released asset");
        }
        released
    }

    /// Drop every resident record.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let count = state.entries.len();
        let bytes = state.used_bytes;
        state.entries.clear();
        state.used_bytes = 0;
        info!(entries = count, bytes, "Asset cache cleared");
    }

    // =========================================================================
    // Pinning
    // =========================================================================

    /// Exempt `key` from eviction. Returns `false` if it is not resident.
    pub fn pin(&self, key: &AssetKey) -> bool {
        let mut state = self.state.lock();
        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.pins += 1;
                true
            }
            None => false,
        }
    }

    /// Undo one [`pin`](Self::pin). Returns `false` if `key` was not pinned.
    pub fn unpin(&self, key: &AssetKey) -> bool {
        let mut state = self.state.lock();
        match state.entries.get_mut(key) {
            Some(entry) if entry.pins > 0 => {
                entry.pins -= 1;
                true
            }
            _ => false,
        }
    }

    /// Keys of all pinned records, sorted.
    pub fn pinned_keys(&self) -> Vec<AssetKey> {
        let state = self.state.lock();
        let mut keys: Vec<AssetKey> = state
            .entries
            .iter()
            .filter(|(_, e)| e.pins > 0)
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn is_pinned(&self, key: &AssetKey) -> bool {
        self.state
            .lock()
            .entries
            .get(key)
            .is_some_and(|e| e.pins > 0)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    fn lookup(&self, key: &AssetKey) -> Option<Arc<AssetRecord>> {
        self.state.lock().touch(key)
    }

    /// Resident record for `key` without loading. Counts as an access.
    pub fn get(&self, key: &AssetKey) -> Option<Arc<AssetRecord>> {
        self.lookup(key)
    }

    /// Best resident record of `identifier` at or below `ceiling`.
    ///
    /// Used to serve the previous tier when a higher one cannot be inserted.
    pub fn resident_at_or_below(
        &self,
        identifier: &str,
        ceiling: QualityTier,
    ) -> Option<Arc<AssetRecord>> {
        let mut state = self.state.lock();
        let key = state.best_at_or_below(identifier, ceiling)?;
        state.touch(&key)
    }

    pub fn contains(&self, key: &AssetKey) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    /// Monotonic time of the last access to `key`.
    pub fn last_access(&self, key: &AssetKey) -> Option<Instant> {
        self.state.lock().entries.get(key).map(|e| e.last_access)
    }

    pub fn resident_bytes(&self) -> u64 {
        self.state.lock().used_bytes
    }

    pub fn entry_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn budget_bytes(&self) -> u64 {
        self.config.budget_bytes
    }

    /// Number of loads currently running.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// The tier `resolve_current` would request right now.
    pub fn current_tier(&self) -> QualityTier {
        self.tier.get()
    }

    pub fn lod(&self) -> &LodProfile {
        &self.config.lod
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        self.counters.fill(&mut stats);
        let state = self.state.lock();
        stats.resident_bytes = state.used_bytes;
        stats.entry_count = state.entries.len();
        stats.budget_bytes = self.config.budget_bytes;
        stats
    }

    // =========================================================================
    // Gate
    // =========================================================================

    pub fn gate(&self) -> CacheGate {
        CacheGate::from_u8(self.gate.load(Ordering::Acquire))
    }

    /// Stop accepting resolves. In-flight loads still complete.
    pub fn pause(&self) {
        self.set_gate(CacheGate::Paused);
    }

    /// Accept resolves again.
    pub fn resume(&self) {
        self.set_gate(CacheGate::Open);
    }

    /// Clear the cache and refuse further inserts until [`resume`](Self::resume).
    pub fn close(&self) {
        self.set_gate(CacheGate::Closed);
        self.clear();
    }

    fn set_gate(&self, gate: CacheGate) {
        let previous = CacheGate::from_u8(self.gate.swap(gate.to_u8(), Ordering::AcqRel));
        if previous != gate {
            debug!(from = ?previous, to = ?gate, "Asset cache gate changed");
        }
    }

    fn check_accepting(&self) -> Result<(), CacheError> {
        match self.gate() {
            CacheGate::Open => Ok(()),
            CacheGate::Paused => Err(CacheError::Suspended),
            CacheGate::Closed => Err(CacheError::Closed),
        }
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::test_support::{ScriptedLoader, ScriptedResponse};
    use proptest::prelude::*;

    fn cache_with(loader: Arc<ScriptedLoader>, budget: u64) -> Arc<AssetCache> {
        let cache = Arc::new(AssetCache::new(
            CacheConfig::default().with_budget(budget),
            loader,
            SharedTier::new(QualityTier::High),
        ));
        cache.resume();
        cache
    }

    // -------------------------------------------------------------------------
    // Resolve
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_resolve_miss_then_hit() {
        let loader = Arc::new(ScriptedLoader::new(100));
        let cache = cache_with(Arc::clone(&loader), 1000);

        let first = cache.resolve("apple", QualityTier::High).await.unwrap();
        let second = cache.resolve("apple", QualityTier::High).await.unwrap();

        assert_eq!(first.generation(), second.generation());
        assert_eq!(loader.load_count(&AssetKey::new("apple", QualityTier::High)), 1);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.resident_bytes, 100);
    }

    #[tokio::test]
    async fn test_resolve_current_uses_shared_tier() {
        let loader = Arc::new(ScriptedLoader::new(100));
        let tier = SharedTier::new(QualityTier::High);
        let cache = Arc::new(AssetCache::new(
            CacheConfig::default(),
            Arc::clone(&loader) as Arc<dyn AssetLoader>,
            tier.clone(),
        ));
        cache.resume();

        tier.set(QualityTier::Medium);
        let record = cache.resolve_current("apple").await.unwrap();
        assert_eq!(record.tier(), QualityTier::Medium);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resolves_share_one_load() {
        let loader = Arc::new(ScriptedLoader::new(100).with_delay(Duration::from_millis(50)));
        let cache = cache_with(Arc::clone(&loader), 10_000);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache.resolve("apple", QualityTier::High).await
            }));
        }

        let mut generations = Vec::new();
        for handle in handles {
            generations.push(handle.await.unwrap().unwrap().generation());
        }

        assert_eq!(loader.load_count(&AssetKey::new("apple", QualityTier::High)), 1);
        assert!(generations.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(cache.entry_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unrelated_keys_load_concurrently() {
        let loader = Arc::new(ScriptedLoader::new(100).with_delay(Duration::from_millis(100)));
        let cache = cache_with(Arc::clone(&loader), 10_000);

        let started = Instant::now();
        let (a, b) = tokio::join!(
            cache.resolve("apple", QualityTier::High),
            cache.resolve("banana", QualityTier::High)
        );
        a.unwrap();
        b.unwrap();

        assert!(started.elapsed() < Duration::from_millis(190));
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_cancel_load() {
        let loader = Arc::new(ScriptedLoader::new(100).with_delay(Duration::from_millis(30)));
        let cache = cache_with(Arc::clone(&loader), 10_000);

        let pending = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.resolve("apple", QualityTier::High).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        pending.abort();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.contains(&AssetKey::new("apple", QualityTier::High)));
        assert_eq!(cache.in_flight_count(), 0);

        cache.resolve("apple", QualityTier::High).await.unwrap();
        assert_eq!(loader.load_count(&AssetKey::new("apple", QualityTier::High)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_timeout() {
        let loader = Arc::new(ScriptedLoader::new(100).with_delay(Duration::from_secs(30)));
        let cache = Arc::new(AssetCache::new(
            CacheConfig::default().with_load_timeout(Duration::from_secs(10)),
            loader,
            SharedTier::default(),
        ));
        cache.resume();

        let err = cache.resolve("apple", QualityTier::High).await.unwrap_err();
        assert!(matches!(err, CacheError::LoadTimeout { timeout, .. } if timeout == Duration::from_secs(10)));
        assert_eq!(cache.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_load_error_propagates_to_all_waiters() {
        let loader = Arc::new(
            ScriptedLoader::new(100)
                .with_delay(Duration::from_millis(20))
                .respond("ghost", ScriptedResponse::Fail(crate::asset::LoadError::NotFound("ghost".into()))),
        );
        let cache = cache_with(Arc::clone(&loader), 10_000);

        let (a, b) = tokio::join!(
            cache.resolve("ghost", QualityTier::High),
            cache.resolve("ghost", QualityTier::High)
        );
        let (a, b) = (a.unwrap_err(), b.unwrap_err());
        assert!(matches!(a, CacheError::Load { .. }));
        assert_eq!(a, b);
        assert_eq!(loader.load_count(&AssetKey::new("ghost", QualityTier::High)), 1);
    }

    #[tokio::test]
    async fn test_loader_panic_reports_aborted() {
        let loader = Arc::new(ScriptedLoader::new(100).respond("bomb", ScriptedResponse::Panic));
        let cache = cache_with(loader, 10_000);

        let err = cache.resolve("bomb", QualityTier::High).await.unwrap_err();
        assert!(matches!(err, CacheError::LoadAborted { .. }));
        assert_eq!(cache.in_flight_count(), 0);
    }

    // -------------------------------------------------------------------------
    // Budget and eviction
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_lru_eviction_order() {
        let loader = Arc::new(ScriptedLoader::new(100));
        let cache = cache_with(loader, 300);

        cache.resolve("a", QualityTier::High).await.unwrap();
        cache.resolve("b", QualityTier::High).await.unwrap();
        cache.resolve("c", QualityTier::High).await.unwrap();
        // Touch "a" so "b" becomes least recently used.
        cache.resolve("a", QualityTier::High).await.unwrap();
        cache.resolve("d", QualityTier::High).await.unwrap();

        assert!(cache.contains(&AssetKey::new("a", QualityTier::High)));
        assert!(!cache.contains(&AssetKey::new("b", QualityTier::High)));
        assert!(cache.contains(&AssetKey::new("c", QualityTier::High)));
        assert!(cache.contains(&AssetKey::new("d", QualityTier::High)));
        assert_eq!(cache.resident_bytes(), 300);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_pinned_records_survive_eviction() {
        let loader = Arc::new(ScriptedLoader::new(100));
        let cache = cache_with(loader, 200);

        cache.resolve("a", QualityTier::High).await.unwrap();
        assert!(cache.pin(&AssetKey::new("a", QualityTier::High)));
        cache.resolve("b", QualityTier::High).await.unwrap();
        cache.resolve("c", QualityTier::High).await.unwrap();

        assert!(cache.contains(&AssetKey::new("a", QualityTier::High)));
        assert!(!cache.contains(&AssetKey::new("b", QualityTier::High)));
        assert!(cache.contains(&AssetKey::new("c", QualityTier::High)));
    }

    #[tokio::test]
    async fn test_budget_exceeded_when_pins_block_room() {
        let loader = Arc::new(ScriptedLoader::new(100));
        let cache = cache_with(loader, 250);

        cache.resolve("a", QualityTier::High).await.unwrap();
        cache.resolve("b", QualityTier::High).await.unwrap();
        cache.pin(&AssetKey::new("a", QualityTier::High));
        cache.pin(&AssetKey::new("b", QualityTier::High));

        let err = cache.resolve("c", QualityTier::High).await.unwrap_err();
        assert!(matches!(
            err,
            CacheError::BudgetExceeded { required: 100, available: 50, .. }
        ));
        assert!(!cache.contains(&AssetKey::new("c", QualityTier::High)));
        assert_eq!(cache.entry_count(), 2);
        assert_eq!(cache.stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_oversized_record_rejected_without_evicting() {
        let loader = Arc::new(ScriptedLoader::new(100).respond("huge", ScriptedResponse::Bytes(500)));
        let cache = cache_with(loader, 300);

        cache.resolve("a", QualityTier::High).await.unwrap();
        let err = cache.resolve("huge", QualityTier::High).await.unwrap_err();

        assert!(matches!(err, CacheError::BudgetExceeded { .. }));
        assert!(cache.contains(&AssetKey::new("a", QualityTier::High)));
    }

    #[tokio::test]
    async fn test_release_moves_to_front_of_eviction() {
        let loader = Arc::new(ScriptedLoader::new(100));
        let cache = cache_with(loader, 200);

        cache.resolve("a", QualityTier::High).await.unwrap();
        cache.resolve("b", QualityTier::High).await.unwrap();
        cache.pin(&AssetKey::new("b", QualityTier::High));

        assert_eq!(cache.release("b"), 1);
        assert!(!cache.is_pinned(&AssetKey::new("b", QualityTier::High)));

        cache.resolve("c", QualityTier::High).await.unwrap();
        assert!(cache.contains(&AssetKey::new("a", QualityTier::High)));
        assert!(!cache.contains(&AssetKey::new("b", QualityTier::High)));
    }

    #[tokio::test]
    async fn test_resident_at_or_below() {
        let loader = Arc::new(ScriptedLoader::new(100));
        let cache = cache_with(loader, 1000);

        cache.resolve("a", QualityTier::Low).await.unwrap();
        let fallback = cache.resident_at_or_below("a", QualityTier::High).unwrap();
        assert_eq!(fallback.tier(), QualityTier::Low);
        assert!(cache.resident_at_or_below("b", QualityTier::High).is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_resident_bytes_within_budget(
            sizes in proptest::collection::vec(1u64..400, 1..24),
            budget in 200u64..1200,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let mut loader = ScriptedLoader::new(1);
                for (i, size) in sizes.iter().enumerate() {
                    loader = loader.respond(&format!("asset-{i}"), ScriptedResponse::Bytes(*size));
                }
                let cache = cache_with(Arc::new(loader), budget);

                for (i, size) in sizes.iter().enumerate() {
                    let id = format!("asset-{i}");
                    let result = cache.resolve(&id, QualityTier::High).await;
                    let key = AssetKey::new(id.as_str(), QualityTier::High);
                    match result {
                        Ok(_) => prop_assert!(cache.contains(&key)),
                        Err(CacheError::BudgetExceeded { .. }) => {
                            prop_assert!(*size > budget);
                            prop_assert!(!cache.contains(&key));
                        }
                        Err(other) => prop_assert!(false, "unexpected error {other}"),
                    }
                    prop_assert!(cache.resident_bytes() <= budget);
                }
                Ok(())
            })?;
        }
    }

    // -------------------------------------------------------------------------
    // Degrade
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_degrade_replaces_with_lower_tier() {
        let loader = Arc::new(ScriptedLoader::new(1000));
        let cache = cache_with(loader, 10_000);

        let high = cache.resolve("a", QualityTier::High).await.unwrap();
        cache.pin(high.key());

        let medium = cache.degrade("a").unwrap();
        assert_eq!(medium.tier(), QualityTier::Medium);
        assert_eq!(medium.estimated_bytes(), 500);
        assert!(medium.payload().ptr_eq(high.payload()));
        assert!(!cache.contains(high.key()));
        assert!(cache.is_pinned(medium.key()));
        assert_eq!(cache.resident_bytes(), 500);

        let low = cache.degrade("a").unwrap();
        assert_eq!(low.tier(), QualityTier::Low);
        assert!(!cache.contains(medium.key()));
    }

    #[tokio::test]
    async fn test_degrade_low_is_not_resident() {
        let loader = Arc::new(ScriptedLoader::new(100));
        let cache = cache_with(loader, 10_000);

        cache.resolve("a", QualityTier::Low).await.unwrap();
        assert!(matches!(
            cache.degrade("a"),
            Err(CacheError::NotResident { .. })
        ));
        assert!(matches!(
            cache.degrade("missing"),
            Err(CacheError::NotResident { .. })
        ));
    }

    #[tokio::test]
    async fn test_degrade_reuses_resident_lower_tier() {
        let loader = Arc::new(ScriptedLoader::new(100));
        let cache = cache_with(loader, 10_000);

        let medium = cache.resolve("a", QualityTier::Medium).await.unwrap();
        cache.resolve("a", QualityTier::High).await.unwrap();

        let degraded = cache.degrade("a").unwrap();
        assert_eq!(degraded.generation(), medium.generation());
        assert_eq!(cache.entry_count(), 1);
    }

    // -------------------------------------------------------------------------
    // Gate
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_new_cache_starts_paused() {
        let loader = Arc::new(ScriptedLoader::new(100));
        let cache = Arc::new(AssetCache::new(
            CacheConfig::default(),
            Arc::clone(&loader) as Arc<dyn AssetLoader>,
            SharedTier::default(),
        ));

        assert_eq!(cache.gate(), CacheGate::Paused);
        assert_eq!(
            cache.resolve("a", QualityTier::High).await.unwrap_err(),
            CacheError::Suspended
        );
        assert_eq!(loader.load_count(&AssetKey::new("a", QualityTier::High)), 0);
    }

    #[tokio::test]
    async fn test_paused_cache_rejects_new_resolves() {
        let loader = Arc::new(ScriptedLoader::new(100));
        let cache = cache_with(loader, 10_000);

        cache.pause();
        assert_eq!(
            cache.resolve("a", QualityTier::High).await.unwrap_err(),
            CacheError::Suspended
        );
        cache.resume();
        assert!(cache.resolve("a", QualityTier::High).await.is_ok());
    }

    #[tokio::test]
    async fn test_in_flight_load_completes_while_paused() {
        let loader = Arc::new(ScriptedLoader::new(100).with_delay(Duration::from_millis(30)));
        let cache = cache_with(loader, 10_000);

        let pending = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.resolve("a", QualityTier::High).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.pause();

        assert!(pending.await.unwrap().is_ok());
        assert!(cache.contains(&AssetKey::new("a", QualityTier::High)));
    }

    #[tokio::test]
    async fn test_close_clears_and_drops_late_loads() {
        let loader = Arc::new(ScriptedLoader::new(100).with_delay(Duration::from_millis(30)));
        let cache = cache_with(loader, 10_000);

        cache.resolve("a", QualityTier::High).await.unwrap();
        let pending = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.resolve("b", QualityTier::High).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.close();

        assert_eq!(pending.await.unwrap().unwrap_err(), CacheError::Closed);
        assert_eq!(cache.entry_count(), 0);
        assert_eq!(cache.resident_bytes(), 0);
    }
}
