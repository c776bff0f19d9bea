//! Detached transfer form of a [`MultiMap`].
//!
//! A [`Snapshot`] captures what is needed to rebuild a map: its version, its
//! comparers, its bucket array length, and every live pair in slot order.
//! Restoring replays the pairs with ordinary inserts, so the rebuilt map has
//! the same content and comparers but a compacted arena. It compares equal
//! to the original under [`MultiMap::content_eq`], and structurally only if
//! the original had no free slots.
//!
//! With the `serde` feature a snapshot can be serialized with any serde
//! format:
//!
//! ```rust
//! # #[cfg(feature = "serde")]
//! # fn main() {
//! use multi_hash::MultiMap;
//! use multi_hash::Snapshot;
//!
//! let mut map = MultiMap::new();
//! map.add_all("k".to_string(), [1, 2]);
//!
//! let json = serde_json::to_string(&map.snapshot()).unwrap();
//! let snapshot: Snapshot<String, i32> = serde_json::from_str(&json).unwrap();
//! let restored = snapshot.restore().unwrap();
//! assert!(restored.content_eq(&map));
//! # }
//! # #[cfg(not(feature = "serde"))]
//! # fn main() {}
//! ```

use alloc::vec::Vec;

use crate::comparer::Comparer;
use crate::comparer::DefaultComparer;
use crate::error::Error;
use crate::error::Result;
use crate::multi_map::MultiMap;
use crate::primes::MAX_PRIME_ARRAY_LENGTH;
use crate::primes::expand_prime;

/// The detached state of a [`MultiMap`].
///
/// `pairs` is `None` only for a map that never allocated; a map that
/// allocated and then emptied carries `Some(vec![])`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Snapshot<K, V, KC = DefaultComparer, VC = DefaultComparer> {
    /// Modification counter of the captured map.
    pub version: u64,
    /// Key comparer of the captured map.
    pub key_comparer: KC,
    /// Value comparer of the captured map.
    pub value_comparer: VC,
    /// Bucket array length of the captured map; zero if it never allocated.
    pub hash_size: usize,
    /// Live pairs in slot order.
    pub pairs: Option<Vec<(K, V)>>,
}

impl<K, V, KC, VC> MultiMap<K, V, KC, VC>
where
    KC: Comparer<K>,
    VC: Comparer<V>,
{
    /// Captures a copy of this map's state.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use multi_hash::MultiMap;
    ///
    /// let mut map = MultiMap::new();
    /// map.add_all(1, [1, 2]);
    /// map.remove_value(&1, &1);
    ///
    /// let snapshot = map.snapshot();
    /// assert_eq!(snapshot.hash_size, 3);
    /// assert_eq!(snapshot.pairs, Some(vec![(1, 2)]));
    ///
    /// let restored = snapshot.restore().unwrap();
    /// assert!(restored.content_eq(&map));
    /// assert_eq!(restored.version(), map.version());
    /// ```
    pub fn snapshot(&self) -> Snapshot<K, V, KC, VC>
    where
        K: Clone,
        V: Clone,
        KC: Clone,
        VC: Clone,
    {
        let table = self.table();
        Snapshot {
            version: self.version(),
            key_comparer: self.key_comparer().clone(),
            value_comparer: self.value_comparer().clone(),
            hash_size: table.capacity(),
            pairs: table.is_allocated().then(|| {
                self.iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            }),
        }
    }

    /// Consumes this map into its snapshot without cloning any pair.
    pub fn into_snapshot(self) -> Snapshot<K, V, KC, VC> {
        let (table, key_comparer, value_comparer, version) = self.into_parts();
        let hash_size = table.capacity();
        let pairs = table.is_allocated().then(|| table.into_pairs());
        Snapshot {
            version,
            key_comparer,
            value_comparer,
            hash_size,
            pairs,
        }
    }

    /// Rebuilds a map from `snapshot`. See [`Snapshot::restore`].
    pub fn from_snapshot(snapshot: Snapshot<K, V, KC, VC>) -> Result<Self> {
        snapshot.restore()
    }
}

impl<K, V, KC, VC> Snapshot<K, V, KC, VC>
where
    KC: Comparer<K>,
    VC: Comparer<V>,
{
    /// Rebuilds the captured map.
    ///
    /// The bucket array is sized from `hash_size`, but never more than one
    /// growth step beyond what `pairs` needs; a map that shrank through
    /// removals therefore restores with a smaller capacity. Every pair is
    /// added back in order, and the version is restored last.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingPairs`] if `hash_size` is nonzero but `pairs` is
    ///   absent.
    /// - [`Error::MalformedSnapshot`] if `hash_size` is zero but `pairs` is
    ///   not empty.
    /// - [`Error::CapacityExhausted`] if `hash_size` exceeds the largest
    ///   table prime.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use multi_hash::DefaultComparer;
    /// use multi_hash::Error;
    /// use multi_hash::Snapshot;
    ///
    /// let snapshot: Snapshot<u8, u8> = Snapshot {
    ///     version: 0,
    ///     key_comparer: DefaultComparer::new(),
    ///     value_comparer: DefaultComparer::new(),
    ///     hash_size: 7,
    ///     pairs: None,
    /// };
    /// assert_eq!(snapshot.restore().unwrap_err(), Error::MissingPairs { hash_size: 7 });
    /// ```
    pub fn restore(self) -> Result<MultiMap<K, V, KC, VC>> {
        let Snapshot {
            version,
            key_comparer,
            value_comparer,
            hash_size,
            pairs,
        } = self;

        let pairs = match (hash_size, pairs) {
            (0, Some(pairs)) if !pairs.is_empty() => {
                return Err(Error::MalformedSnapshot {
                    reason: "pairs present without a bucket array",
                });
            }
            (0, _) => Vec::new(),
            (hash_size, None) => return Err(Error::MissingPairs { hash_size }),
            (hash_size, Some(_)) if hash_size > MAX_PRIME_ARRAY_LENGTH => {
                return Err(Error::CapacityExhausted {
                    requested: hash_size,
                    max: MAX_PRIME_ARRAY_LENGTH,
                });
            }
            (_, Some(pairs)) => pairs,
        };

        // At most one growth step past the pairs, so a forged `hash_size`
        // cannot force a huge allocation.
        let capacity = hash_size.min(expand_prime(pairs.len()));
        let mut map = MultiMap::with_capacity_and_comparers(capacity, key_comparer, value_comparer);
        log::debug!(
            "restoring snapshot: {} pairs into {} buckets",
            pairs.len(),
            map.capacity()
        );
        map.extend(pairs);
        map.set_version(version);
        Ok(map)
    }
}
