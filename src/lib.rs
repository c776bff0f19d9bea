#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// Injected equality and hashing for keys and values.
pub mod comparer;

pub mod error;

pub mod hash_table;

/// A hash table holding any number of values per key.
///
/// This module provides [`MultiMap`], which wraps the chained
/// [`HashTable`](hash_table::HashTable) and routes every key and value
/// comparison through injected [`Comparer`]s.
pub mod multi_map;

mod multi_map_proptest;

pub mod primes;

pub mod snapshot;

pub use comparer::Comparer;
pub use comparer::DefaultComparer;
pub use error::Error;
pub use error::Result;
pub use multi_map::Cursor;
pub use multi_map::MultiMap;
pub use snapshot::Snapshot;
