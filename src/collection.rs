use crate::Stats;
use crate::error::Error;
use crate::parser::Parser;
use entry::{Entry, State};
use parking_lot::Mutex;
use recency_list::RecencyList;
use stats::Counters;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, trace, warn};

mod entry;
mod recency_list;
pub(crate) mod stats;

/// Where builds requested by [`Collection::get`] run.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Materialization {
    /// The build runs on the calling thread once the recency bookkeeping is done. Build failures
    /// are returned from [`Collection::get`].
    #[default]
    Inline,
    /// The build is handed to the global [`rayon`] thread pool and `get` returns right away.
    /// Failures are logged and the entry is built again on its next resolution.
    Background,
}

/// Thread-safe, lazily populated cache over a fixed, ordered set of sources.
///
/// Every source is turned into an item by the [`Parser`] the first time its position is accessed.
/// Accessed positions are tracked from most to least recently used, and [`Collection::trim`]
/// evicts the least recently used items until at most `threshold` remain.
///
/// Wrap the collection in a [`std::sync::Arc`] to share it between threads. All operations only
/// require shared references.
pub struct Collection<S, P: Parser<S>> {
    inner: Arc<Inner<S, P>>,
}

struct Inner<S, P: Parser<S>> {
    parser: P,
    entries: Box<[Entry<S, P::Item>]>,
    recency: Mutex<RecencyList>,
    count: AtomicUsize,
    threshold: AtomicUsize,
    materialization: Materialization,
    counters: Counters,
    metrics_last_accessed: Mutex<Instant>,
}

impl<S, P> Collection<S, P>
where
    P: Parser<S>,
{
    /// Creates a collection that builds items inline on [`Collection::get`].
    ///
    /// Fails with [`Error::InvalidThreshold`] if `threshold` is 0.
    pub fn new(
        threshold: usize,
        parser: P,
        sources: impl IntoIterator<Item = S>,
    ) -> Result<Self, Error<P::Error>> {
        Self::with_materialization(threshold, parser, sources, Materialization::Inline)
    }

    /// Creates a collection that builds items as configured by `materialization`.
    ///
    /// Fails with [`Error::InvalidThreshold`] if `threshold` is 0.
    pub fn with_materialization(
        threshold: usize,
        parser: P,
        sources: impl IntoIterator<Item = S>,
        materialization: Materialization,
    ) -> Result<Self, Error<P::Error>> {
        validate_threshold::<P::Error>(threshold)?;

        let entries: Box<[Entry<S, P::Item>]> = sources.into_iter().map(Entry::new).collect();
        let recency = RecencyList::with_capacity(entries.len());

        debug!(
            sources = entries.len(),
            threshold,
            ?materialization,
            "created collection"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                parser,
                entries,
                recency: Mutex::new(recency),
                count: AtomicUsize::new(0),
                threshold: AtomicUsize::new(threshold),
                materialization,
                counters: Counters::default(),
                metrics_last_accessed: Mutex::new(Instant::now()),
            }),
        })
    }

    /// Returns the number of sources.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Returns `true` if the collection was created without sources.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Returns the number of currently materialized items.
    pub fn count(&self) -> usize {
        self.inner.count.load(Ordering::Acquire)
    }

    /// Returns the number of items kept by [`Collection::trim`].
    pub fn threshold(&self) -> usize {
        self.inner.threshold.load(Ordering::Acquire)
    }

    /// Sets the number of items kept by [`Collection::trim`].
    ///
    /// The new value takes effect on the next trim. Fails with [`Error::InvalidThreshold`] if
    /// `threshold` is 0, leaving the current value untouched.
    pub fn set_threshold(&self, threshold: usize) -> Result<(), Error<P::Error>> {
        validate_threshold::<P::Error>(threshold)?;
        self.inner.threshold.store(threshold, Ordering::Release);
        Ok(())
    }

    /// Returns the indices of the tracked entries, most recently used first.
    pub fn recency_order(&self) -> Vec<usize> {
        let recency = self.inner.recency.lock();
        let mut order = Vec::with_capacity(recency.len());
        order.extend(recency.iter());
        order
    }

    /// Evicts the least recently used items until at most `threshold` items remain.
    ///
    /// Only built items are evicted. Entries whose build is still running stay in the recency
    /// list and are not counted. Calling this while `count <= threshold` does nothing.
    ///
    /// Evicted items are handed to [`Parser::dispose`]. A failing disposal does not stop the
    /// trim: the error is logged, counted in [`Stats::dispose_failure_count`], and the item is
    /// dropped from the collection anyway.
    ///
    /// Returns the number of items that were disposed.
    pub fn trim(&self) -> usize {
        let threshold = self.threshold();
        let disposed = self.inner.evict_down_to(threshold);
        debug!(disposed, threshold, count = self.count(), "trimmed collection");
        disposed
    }

    /// Evicts every entry and withdraws pending background builds. Disposal failures are handled
    /// as in [`Collection::trim`].
    pub fn clear(&self) -> usize {
        let disposed = self.inner.evict_all();
        debug!(disposed, "cleared collection");
        disposed
    }

    /// Returns the counters collected since the previous call and resets them.
    pub fn stats(&self) -> Stats {
        let mut stats = Stats::default();

        let millis_elapsed = {
            let mut guard = self.inner.metrics_last_accessed.lock();
            let millis_elapsed = guard.elapsed().as_millis();
            *guard = Instant::now();
            millis_elapsed
        };

        stats.millis_elapsed = millis_elapsed;
        self.inner.counters.drain_into(&mut stats);

        stats
    }
}

impl<S, P> Collection<S, P>
where
    S: Send + Sync + 'static,
    P: Parser<S> + Send + Sync + 'static,
    P::Item: Send + Sync + 'static,
{
    /// Marks the entry at `index` as most recently used and makes sure its item gets built.
    ///
    /// With [`Materialization::Inline`] the item is built before this method returns, unless
    /// another caller is already building it. With [`Materialization::Background`] the build is
    /// only scheduled. Either way, [`EntryRef::resolve`] returns the item once it is available.
    pub fn get(&self, index: usize) -> Result<EntryRef<'_, S, P>, Error<P::Error>> {
        let Some(entry) = self.inner.entries.get(index) else {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.len(),
            });
        };

        let scheduled = {
            let mut recency = self.inner.recency.lock();
            let scheduled = entry.ensure_materializing();
            if !scheduled && entry.state() == State::Materialized {
                self.inner.counters.increment_hit_count();
            }
            if recency.promote(index) {
                entry.advance_generation();
            }
            scheduled
        };

        trace!(index, scheduled, "promoted entry");

        if scheduled {
            self.dispatch(index)?;
        }

        Ok(EntryRef {
            inner: &self.inner,
            index,
        })
    }

    /// Shorthand for [`Collection::get`] followed by [`EntryRef::resolve`].
    pub fn resolve(&self, index: usize) -> Result<Arc<P::Item>, Error<P::Error>> {
        self.get(index)?.resolve().map_err(Error::Build)
    }

    fn dispatch(&self, index: usize) -> Result<(), Error<P::Error>> {
        match self.inner.materialization {
            Materialization::Inline => self.inner.build_scheduled(index).map_err(Error::Build),
            Materialization::Background => {
                let inner = Arc::clone(&self.inner);
                rayon::spawn(move || {
                    if let Err(error) = inner.build_scheduled(index) {
                        warn!(index, %error, "background build failed");
                    }
                });
                Ok(())
            }
        }
    }
}

impl<S, P: Parser<S>> fmt::Debug for Collection<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("len", &self.len())
            .field("count", &self.count())
            .field("threshold", &self.threshold())
            .field("materialization", &self.inner.materialization)
            .finish_non_exhaustive()
    }
}

impl<S, P: Parser<S>> Inner<S, P> {
    fn parse(&self, index: usize, source: &S) -> Result<P::Item, P::Error> {
        self.counters.increment_miss_count();
        trace!(index, "building item");
        self.parser.parse(source)
    }

    fn build_scheduled(&self, index: usize) -> Result<(), P::Error> {
        self.entries[index]
            .build_scheduled(
                &self.count,
                || self.unlink(index),
                |source| self.parse(index, source),
            )
            .map(|_| ())
    }

    fn resolve(&self, index: usize) -> Result<Arc<P::Item>, P::Error> {
        self.entries[index].resolve(
            &self.count,
            || self.link(index),
            || self.unlink(index),
            |source| self.parse(index, source),
        )
    }

    // An entry that is resolved after being evicted goes back into the recency list before its
    // item is built, so a later trim can find it.
    fn link(&self, index: usize) {
        let mut recency = self.recency.lock();
        if !recency.contains(index) {
            recency.promote(index);
            self.entries[index].advance_generation();
            trace!(index, "linked entry on resolve");
        }
    }

    fn unlink(&self, index: usize) {
        let mut recency = self.recency.lock();
        if recency.remove(index) {
            self.entries[index].advance_generation();
            trace!(index, "unlinked entry after failed build");
        }
    }

    fn evict_down_to(&self, limit: usize) -> usize {
        // Entries still being built are skipped, they are not part of `count` yet.
        let evicted: Vec<(usize, u64)> = {
            let mut recency = self.recency.lock();
            let excess = self.count.load(Ordering::Acquire).saturating_sub(limit);
            let victims: Vec<usize> = recency
                .iter_back()
                .filter(|&index| self.entries[index].state() == State::Materialized)
                .take(excess)
                .collect();
            victims
                .into_iter()
                .filter(|&index| recency.remove(index))
                .map(|index| (index, self.entries[index].advance_generation()))
                .collect()
        };

        self.dispose_evicted(evicted)
    }

    fn evict_all(&self) -> usize {
        // Pending builds are withdrawn as well.
        let evicted: Vec<(usize, u64)> = {
            let mut recency = self.recency.lock();
            std::iter::from_fn(|| recency.pop_back())
                .map(|index| (index, self.entries[index].advance_generation()))
                .collect()
        };

        self.dispose_evicted(evicted)
    }

    fn dispose_evicted(&self, evicted: Vec<(usize, u64)>) -> usize {
        // Entry locks are only taken after the structural lock is released. Entries linked again
        // in between keep their item, see `Entry::invalidate`.
        let mut disposed = 0;
        for (index, generation) in evicted {
            let removed = self.entries[index].invalidate(generation, &self.count, |item| {
                if let Err(error) = self.parser.dispose(item) {
                    self.counters.increment_dispose_failure_count();
                    warn!(index, %error, "failed to dispose evicted item");
                }
            });

            if removed {
                disposed += 1;
                self.counters.increment_eviction_count();
                trace!(index, "evicted entry");
            }
        }

        disposed
    }
}

/// Handle to an entry of a [`Collection`], returned by [`Collection::get`].
pub struct EntryRef<'a, S, P: Parser<S>> {
    inner: &'a Inner<S, P>,
    index: usize,
}

impl<'a, S, P: Parser<S>> EntryRef<'a, S, P> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn source(&self) -> &'a S {
        self.inner.entries[self.index].source()
    }

    /// Returns `true` if the item is currently built.
    pub fn is_materialized(&self) -> bool {
        self.inner.entries[self.index].state() == State::Materialized
    }

    /// Returns the item if it is currently built, without building it.
    pub fn peek(&self) -> Option<Arc<P::Item>> {
        self.inner.entries[self.index].peek()
    }

    /// Returns the item, building it on the calling thread if it is absent.
    ///
    /// Blocks while another thread builds or evicts the same item. Parser errors are returned
    /// unchanged and leave the entry empty, so the next resolution tries again.
    ///
    /// Only [`Collection::get`] records hits, returning an already built item here does not.
    pub fn resolve(&self) -> Result<Arc<P::Item>, P::Error> {
        self.inner.resolve(self.index)
    }
}

impl<S, P: Parser<S>> fmt::Debug for EntryRef<'_, S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryRef")
            .field("index", &self.index)
            .field("state", &self.inner.entries[self.index].state())
            .finish_non_exhaustive()
    }
}

fn validate_threshold<E>(threshold: usize) -> Result<(), Error<E>> {
    if threshold < 1 {
        return Err(Error::InvalidThreshold(threshold));
    }
    Ok(())
}
