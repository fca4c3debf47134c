// Multi-threaded tests for builds, promotions and trims racing on one collection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use plain_lazy_cache::{Collection, Materialization, Parser};

#[derive(Debug, thiserror::Error)]
#[error("unreachable")]
struct Never;

/// Counts parses and disposals per source index.
#[derive(Debug)]
struct Counting {
    parsed: Vec<AtomicUsize>,
    disposed: Vec<AtomicUsize>,
}

impl Counting {
    fn new(len: usize) -> Arc<Self> {
        Arc::new(Self {
            parsed: (0..len).map(|_| AtomicUsize::new(0)).collect(),
            disposed: (0..len).map(|_| AtomicUsize::new(0)).collect(),
        })
    }

    fn parsed(&self, index: usize) -> usize {
        self.parsed[index].load(Ordering::Acquire)
    }

    fn total_parsed(&self) -> usize {
        (0..self.parsed.len()).map(|index| self.parsed(index)).sum()
    }

    fn total_disposed(&self) -> usize {
        self.disposed
            .iter()
            .map(|counter| counter.load(Ordering::Acquire))
            .sum()
    }
}

struct Squares(Arc<Counting>);

impl Parser<usize> for Squares {
    type Item = usize;
    type Error = Never;

    fn parse(&self, source: &usize) -> Result<usize, Never> {
        self.0.parsed[*source].fetch_add(1, Ordering::AcqRel);
        Ok(source * source)
    }

    fn dispose(&self, item: &usize) -> Result<(), Never> {
        let index = (0..self.0.disposed.len())
            .find(|index| index * index == *item)
            .unwrap();
        self.0.disposed[index].fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn squares(
    threshold: usize,
    len: usize,
    materialization: Materialization,
) -> (Arc<Collection<usize, Squares>>, Arc<Counting>) {
    let counting = Counting::new(len);
    let collection = Collection::with_materialization(
        threshold,
        Squares(Arc::clone(&counting)),
        0..len,
        materialization,
    )
    .unwrap();
    (Arc::new(collection), counting)
}

#[test]
fn concurrent_resolutions_of_one_entry_build_once() {
    init_tracing();

    for materialization in [Materialization::Inline, Materialization::Background] {
        for _ in 0..100 {
            let (collection, counting) = squares(1, 1, materialization);
            let barrier = Arc::new(Barrier::new(8));

            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let collection = Arc::clone(&collection);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        collection.resolve(0).unwrap()
                    })
                })
                .collect();

            let items: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

            assert!(items.iter().all(|item| Arc::ptr_eq(item, &items[0])));
            assert_eq!(counting.parsed(0), 1);
            assert_eq!(collection.count(), 1);
        }
    }
}

#[test]
fn racing_gets_and_trims_keep_the_count_consistent() {
    init_tracing();

    for materialization in [Materialization::Inline, Materialization::Background] {
        let threshold = 4;
        let len = 16;
        let (collection, counting) = squares(threshold, len, materialization);
        let barrier = Arc::new(Barrier::new(6));

        let mut handles = Vec::new();

        for worker in 0..4 {
            let collection = Arc::clone(&collection);
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                for step in 0..2_000 {
                    let index = (worker * 7 + step * 3) % len;
                    let item = collection.get(index).unwrap().resolve().unwrap();
                    assert_eq!(*item, index * index);
                }
            }));
        }

        for _ in 0..2 {
            let collection = Arc::clone(&collection);
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                for _ in 0..2_000 {
                    collection.trim();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        // background builds still queued find their entry built or evicted and do nothing
        assert_eq!(collection.count(), collection.recency_order().len());
        assert_eq!(
            counting.total_parsed() - counting.total_disposed(),
            collection.count()
        );

        collection.trim();

        assert!(collection.count() <= threshold);
        assert_eq!(collection.count(), collection.recency_order().len());
        assert_eq!(
            counting.total_parsed() - counting.total_disposed(),
            collection.count()
        );
    }
}

#[test]
fn each_evicted_item_is_disposed_exactly_once() {
    init_tracing();

    let (collection, counting) = squares(1, 8, Materialization::Inline);

    for round in 0..50 {
        for index in 0..8 {
            collection.resolve((index + round) % 8).unwrap();
        }
        collection.trim();
        assert_eq!(collection.count(), 1);
    }

    // the survivor of a round is accessed again before the next trim
    assert_eq!(counting.total_parsed(), 8 + 49 * 7);
    assert_eq!(counting.total_disposed(), counting.total_parsed() - 1);
}

#[test]
fn recency_order_follows_the_last_access() {
    init_tracing();

    let (collection, _) = squares(3, 5, Materialization::Inline);

    for index in [0, 1, 2, 3, 4, 1] {
        collection.get(index).unwrap();
    }

    assert_eq!(collection.recency_order(), vec![1, 4, 3, 2, 0]);

    collection.trim();

    assert_eq!(collection.recency_order(), vec![1, 4, 3]);
    assert_eq!(collection.count(), 3);
}
