use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};

const EMPTY: u8 = 0;
const MATERIALIZING: u8 = 1;
const MATERIALIZED: u8 = 2;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum State {
    Empty,
    Materializing,
    Materialized,
}

pub(crate) struct Entry<S, T> {
    source: S,
    item: Mutex<Option<Arc<T>>>,
    state: AtomicU8,
    // Changes whenever the entry is linked into or unlinked from the recency list. Only written
    // while the structural lock of the owning collection is held.
    generation: AtomicU64,
}

impl<S, T> Entry<S, T> {
    pub(crate) fn new(source: S) -> Self {
        Self {
            source,
            item: Mutex::new(None),
            state: AtomicU8::new(EMPTY),
            generation: AtomicU64::new(0),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub(crate) fn state(&self) -> State {
        match self.state.load(Ordering::Acquire) {
            EMPTY => State::Empty,
            MATERIALIZING => State::Materializing,
            _ => State::Materialized,
        }
    }

    pub(crate) fn peek(&self) -> Option<Arc<T>> {
        self.item.lock().clone()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn advance_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Requests a build of the item.
    ///
    /// Returns `true` only for the caller that moved the entry out of the empty state. That caller
    /// is responsible for running [Entry::build_scheduled].
    pub(crate) fn ensure_materializing(&self) -> bool {
        self.state
            .compare_exchange(EMPTY, MATERIALIZING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Builds the item on behalf of an earlier [Entry::ensure_materializing] request.
    ///
    /// Nothing is built if the request was withdrawn by an eviction in the meantime or if another
    /// caller already stored the item. `unlink` runs under the entry lock if the build fails.
    pub(crate) fn build_scheduled<E>(
        &self,
        count: &AtomicUsize,
        unlink: impl FnOnce(),
        parse: impl FnOnce(&S) -> Result<T, E>,
    ) -> Result<Option<Arc<T>>, E> {
        let mut item = self.item.lock();

        if let Some(existing) = item.as_ref() {
            return Ok(Some(Arc::clone(existing)));
        }

        if self.state.load(Ordering::Acquire) != MATERIALIZING {
            return Ok(None);
        }

        self.build_locked(&mut item, count, unlink, parse).map(Some)
    }

    /// Returns the item, building it synchronously if it is absent.
    ///
    /// `link` runs under the entry lock right before the build, so that an eviction of this entry
    /// cannot slip in between linking and storing the new item. `unlink` undoes it if the build
    /// fails.
    pub(crate) fn resolve<E>(
        &self,
        count: &AtomicUsize,
        link: impl FnOnce(),
        unlink: impl FnOnce(),
        parse: impl FnOnce(&S) -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        let mut item = self.item.lock();

        if let Some(existing) = item.as_ref() {
            return Ok(Arc::clone(existing));
        }

        link();
        self.state.store(MATERIALIZING, Ordering::Release);

        self.build_locked(&mut item, count, unlink, parse)
    }

    /// Disposes and clears the item if the entry was not linked again since `generation`.
    ///
    /// Returns `true` if an item was removed.
    pub(crate) fn invalidate(
        &self,
        generation: u64,
        count: &AtomicUsize,
        dispose: impl FnOnce(&T),
    ) -> bool {
        let mut item = self.item.lock();

        if self.generation() != generation {
            return false;
        }

        self.state.store(EMPTY, Ordering::Release);

        match item.take() {
            Some(removed) => {
                dispose(&removed);
                count.fetch_sub(1, Ordering::AcqRel);
                true
            }
            None => false,
        }
    }

    fn build_locked<E>(
        &self,
        item: &mut Option<Arc<T>>,
        count: &AtomicUsize,
        unlink: impl FnOnce(),
        parse: impl FnOnce(&S) -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        match parse(&self.source) {
            Ok(built) => {
                let built = Arc::new(built);
                *item = Some(Arc::clone(&built));
                count.fetch_add(1, Ordering::AcqRel);
                self.state.store(MATERIALIZED, Ordering::Release);
                Ok(built)
            }
            Err(err) => {
                // only entries holding an item stay in the recency list
                unlink();
                self.state.store(EMPTY, Ordering::Release);
                Err(err)
            }
        }
    }
}
