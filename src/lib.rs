//! A thread-safe, lazily populated cache over a fixed set of sources.
//!
//! A [`Collection`] is created from an ordered list of sources and a [`Parser`] that turns a
//! source into an item. Items are built the first time their position is accessed and kept until
//! they are evicted. Accesses are tracked from most to least recently used, and
//! [`Collection::trim`] evicts the least recently used items until at most `threshold` items
//! remain.
//!
//! # Features
//!
//! - Thread-safe by default - no need for explicit synchronization
//! - At most one build per entry at a time, concurrent readers wait for it
//! - Builds never run while the recency list is locked
//! - Optional background builds on the [`rayon`] thread pool
//! - No unsafe code
//!
//! # Eviction
//!
//! Trimming is explicit. Accessing more than `threshold` entries does not evict anything until
//! [`Collection::trim`] is called. Evicted items are passed to [`Parser::dispose`]; a failing
//! disposal is logged through [`tracing`], counted in [`Stats::dispose_failure_count`], and does
//! not stop the trim.
//!
//! # Examples
//!
//! Basic usage with a closure as parser:
//!
//! ```rust
//! use plain_lazy_cache::Collection;
//! use std::convert::Infallible;
//!
//! let lengths = Collection::new(
//!     2,
//!     |source: &&str| Ok::<_, Infallible>(source.len()),
//!     ["a", "bb", "ccc"],
//! )
//! .unwrap();
//!
//! assert_eq!(*lengths.resolve(1).unwrap(), 2);
//! assert_eq!(lengths.count(), 1);
//! ```
//!
//! Trimming the least recently used items:
//!
//! ```rust
//! use plain_lazy_cache::Collection;
//! use std::convert::Infallible;
//!
//! let upper = Collection::new(
//!     2,
//!     |source: &&str| Ok::<_, Infallible>(source.to_uppercase()),
//!     ["a", "b", "c"],
//! )
//! .unwrap();
//!
//! upper.get(0).unwrap();
//! upper.get(1).unwrap();
//! upper.get(2).unwrap();
//! assert_eq!(upper.count(), 3);
//!
//! upper.trim();
//!
//! assert_eq!(upper.count(), 2);
//! assert_eq!(upper.recency_order(), vec![2, 1]);
//! ```
//!
//! Thread-safe usage across multiple threads:
//!
//! ```rust
//! use plain_lazy_cache::Collection;
//! use std::convert::Infallible;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let squares = Arc::new(
//!     Collection::new(10, |n: &u64| Ok::<_, Infallible>(n * n), 0..10).unwrap(),
//! );
//!
//! let squares_in_arc = Arc::clone(&squares);
//! let handle = thread::spawn(move || *squares_in_arc.resolve(3).unwrap());
//!
//! assert_eq!(handle.join().unwrap(), 9);
//! assert_eq!(*squares.resolve(3).unwrap(), 9);
//! ```

#![forbid(unsafe_code)]
pub mod collection;
pub mod error;
pub mod parser;

pub use collection::stats::Stats;
pub use collection::{Collection, EntryRef, Materialization};
pub use error::Error;
pub use parser::Parser;
