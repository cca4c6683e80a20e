//! Cache statistics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Resolves served from a resident record.
    pub hits: u64,
    /// Resolves that started a new load.
    pub misses: u64,
    /// Resolves that joined an in-flight load.
    pub coalesced: u64,
    /// Loads issued to the loader.
    pub loads: u64,
    /// Records evicted to make room.
    pub evictions: u64,
    /// Insertions refused with `BudgetExceeded`.
    pub rejected: u64,
    /// Aggregate estimated bytes of resident records.
    pub resident_bytes: u64,
    /// Number of resident records.
    pub entry_count: usize,
    /// Configured budget.
    pub budget_bytes: u64,
}

impl CacheStats {
    /// Fraction of resolves served without a new load (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.coalesced;
        if total == 0 {
            0.0
        } else {
            (self.hits + self.coalesced) as f64 / total as f64
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entries, {}/{} bytes, {:.1}% hit rate, {} evictions",
            self.entry_count,
            self.resident_bytes,
            self.budget_bytes,
            self.hit_rate() * 100.0,
            self.evictions
        )
    }
}

/// Lock-free counters updated on the hot path.
#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    pub(crate) hits: AtomicU64,
    pub(crate) misses: AtomicU64,
    pub(crate) coalesced: AtomicU64,
    pub(crate) loads: AtomicU64,
    pub(crate) evictions: AtomicU64,
    pub(crate) rejected: AtomicU64,
}

impl CacheCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fill(&self, stats: &mut CacheStats) {
        stats.hits = self.hits.load(Ordering::Relaxed);
        stats.misses = self.misses.load(Ordering::Relaxed);
        stats.coalesced = self.coalesced.load(Ordering::Relaxed);
        stats.loads = self.loads.load(Ordering::Relaxed);
        stats.evictions = self.evictions.load(Ordering::Relaxed);
        stats.rejected = self.rejected.load(Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_empty() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_counts_coalesced_as_served() {
        let stats = CacheStats {
            hits: 2,
            misses: 1,
            coalesced: 1,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }
}
