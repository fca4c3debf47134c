use std::sync::atomic::{AtomicU64, Ordering};

/// Counters collected since the previous call to
/// [`Collection::stats`](crate::Collection::stats).
///
/// A hit is a call to [`Collection::get`](crate::Collection::get) that found its item already
/// materialized. Resolving an [`EntryRef`](crate::EntryRef) is not counted as a hit. A miss is
/// every invocation of the parser. Evictions count the items disposed by a trim or clear.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct Stats {
    pub miss_count: u64,
    pub hit_count: u64,
    pub eviction_count: u64,
    pub dispose_failure_count: u64,
    pub millis_elapsed: u128,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    eviction_count: AtomicU64,
    dispose_failure_count: AtomicU64,
}

impl Counters {
    pub(crate) fn increment_hit_count(&self) {
        self.hit_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn increment_miss_count(&self) {
        self.miss_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn increment_eviction_count(&self) {
        self.eviction_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn increment_dispose_failure_count(&self) {
        self.dispose_failure_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Reads all counters into `stats` and resets them.
    pub(crate) fn drain_into(&self, stats: &mut Stats) {
        stats.hit_count += self.hit_count.swap(0, Ordering::AcqRel);
        stats.miss_count += self.miss_count.swap(0, Ordering::AcqRel);
        stats.eviction_count += self.eviction_count.swap(0, Ordering::AcqRel);
        stats.dispose_failure_count += self.dispose_failure_count.swap(0, Ordering::AcqRel);
    }
}
