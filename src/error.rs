//! Error type for fallible [`MultiMap`](crate::MultiMap) operations.

use thiserror::Error;

/// Errors reported by the multi-value table.
///
/// Every variant is a contract violation by the caller; nothing here is
/// transient and nothing is retried internally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A bulk copy-out destination cannot hold the data; nothing was written.
    #[error("destination too small: {required} slots required, {available} available")]
    InsufficientSpace {
        /// Number of elements the copy needs room for
        required: usize,
        /// Number of elements the destination can take
        available: usize,
    },

    /// A copy-out start index lies past the end of the destination.
    #[error("index {index} out of range for destination of length {len}")]
    IndexOutOfRange {
        /// The requested start index
        index: usize,
        /// The destination length
        len: usize,
    },

    /// The table changed after a cursor was created.
    #[error("collection was modified; enumeration cannot continue")]
    ConcurrentModification,

    /// A snapshot declared a bucket array but carried no pairs.
    #[error("snapshot declares {hash_size} buckets but carries no pairs")]
    MissingPairs {
        /// The declared bucket array length
        hash_size: usize,
    },

    /// A snapshot is internally inconsistent.
    #[error("malformed snapshot: {reason}")]
    MalformedSnapshot {
        /// What was inconsistent
        reason: &'static str,
    },

    /// The table cannot grow to the requested size.
    #[error("capacity exhausted: requested {requested} slots, limit is {max}")]
    CapacityExhausted {
        /// The requested number of slots
        requested: usize,
        /// The largest supported bucket array length
        max: usize,
    },
}

/// Result alias for multi-value table operations.
pub type Result<T, E = Error> = core::result::Result<T, E>;
