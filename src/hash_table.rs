//! The raw chained table underneath [`MultiMap`](crate::MultiMap).
//!
//! `HashTable<K, V>` knows nothing about how keys are hashed or compared:
//! every operation takes a precomputed hash plus a predicate, the same way
//! the comparer-driven layer above calls it. Storage is two flat arrays:
//!
//! - `buckets`: one optional head index per bucket, sized to a prime.
//! - `slots`: an arena of [`Slot`]s. Occupied slots are threaded into their
//!   bucket's chain, free slots into the free list, both through `next`.
//!
//! New slots are always prepended to their chain, so a chain lists entries
//! newest first. A resize keeps every slot at its index and rebuilds the
//! chains by scanning the arena in ascending order, which leaves each chain
//! in descending index order afterwards.

use alloc::vec;
use alloc::vec::Vec;

use crate::error::Error;
use crate::error::Result;
use crate::primes::MAX_PRIME_ARRAY_LENGTH;
use crate::primes::expand_prime;
use crate::primes::get_prime;

/// One arena slot.
#[derive(Clone, Debug)]
pub enum Slot<K, V> {
    /// A live pair linked into the chain of bucket `hash % capacity`.
    Occupied {
        /// Hash of `key`, as computed by the key comparer
        hash: u64,
        /// Next slot in the same bucket chain
        next: Option<usize>,
        /// The key
        key: K,
        /// The value
        value: V,
    },
    /// A reusable slot linked into the free list.
    Free {
        /// Next slot in the free list
        next: Option<usize>,
    },
}

impl<K, V> Slot<K, V> {
    /// Returns `true` for a live slot.
    #[inline]
    pub fn is_occupied(&self) -> bool {
        matches!(self, Slot::Occupied { .. })
    }

    /// Returns the link to the following slot in whichever list this slot is on.
    #[inline]
    pub fn next(&self) -> Option<usize> {
        match self {
            Slot::Occupied { next, .. } | Slot::Free { next } => *next,
        }
    }

    #[inline]
    fn set_next(&mut self, link: Option<usize>) {
        match self {
            Slot::Occupied { next, .. } | Slot::Free { next } => *next = link,
        }
    }
}

/// A chained hash table over a slot arena with an index-based free list.
///
/// Keys may repeat: the table never deduplicates, it only links. Callers
/// decide what "equal" means through the predicates they pass in.
///
/// ## Example
///
/// ```rust
/// use multi_hash::hash_table::HashTable;
///
/// let mut table: HashTable<&str, i32> = HashTable::with_capacity(0);
/// table.ensure_allocated();
///
/// let hash = 42;
/// let bucket = table.bucket_for(hash);
/// let bucket = table.insert(hash, "a", 1, bucket);
/// table.insert(hash, "a", 2, bucket);
///
/// // Newest first.
/// let first = table.find(hash, |k| *k == "a").unwrap();
/// assert_eq!(table.get(first), Some((&"a", &2)));
/// assert_eq!(table.remove_where(hash, |k, _| *k == "a"), 2);
/// assert!(table.is_empty());
/// ```
#[derive(Clone, Debug)]
pub struct HashTable<K, V> {
    buckets: Vec<Option<usize>>,
    slots: Vec<Slot<K, V>>,
    free_head: Option<usize>,
    free_count: usize,
}

impl<K, V> Default for HashTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> HashTable<K, V> {
    /// Creates an unallocated table. The first call to
    /// [`ensure_allocated`](Self::ensure_allocated) sizes it.
    pub const fn new() -> Self {
        Self {
            buckets: Vec::new(),
            slots: Vec::new(),
            free_head: None,
            free_count: 0,
        }
    }

    /// Creates a table sized for at least `capacity` entries. A capacity of
    /// zero allocates nothing.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut table = Self::new();
        if capacity > 0 {
            table.initialize(capacity);
        }
        table
    }

    /// Discards all contents and allocates `get_prime(capacity)` buckets and
    /// slots.
    pub fn initialize(&mut self, capacity: usize) {
        let size = get_prime(capacity);
        self.buckets = vec![None; size];
        self.slots = Vec::with_capacity(size);
        self.free_head = None;
        self.free_count = 0;
    }

    /// Allocates the smallest table if nothing has been allocated yet.
    #[inline]
    pub fn ensure_allocated(&mut self) {
        if !self.is_allocated() {
            self.initialize(0);
        }
    }

    /// Returns `true` once a bucket array exists.
    #[inline]
    pub fn is_allocated(&self) -> bool {
        !self.buckets.is_empty()
    }

    /// Returns the bucket array length, which is also the slot arena size.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the number of live entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len() - self.free_count
    }

    /// Returns `true` if no entry is live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns how many arena slots have ever been handed out, live or free.
    #[inline]
    pub fn slots_used(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of slots on the free list.
    #[inline]
    pub fn free_count(&self) -> usize {
        self.free_count
    }

    /// Returns the slot that the next insert will reuse, if any.
    #[inline]
    pub fn free_head(&self) -> Option<usize> {
        self.free_head
    }

    /// The bucket heads.
    #[inline]
    pub fn buckets(&self) -> &[Option<usize>] {
        &self.buckets
    }

    /// The slot arena, up to [`slots_used`](Self::slots_used).
    #[inline]
    pub fn slots(&self) -> &[Slot<K, V>] {
        &self.slots
    }

    /// Maps `hash` to its bucket. The table must be allocated.
    #[inline]
    pub fn bucket_for(&self, hash: u64) -> usize {
        debug_assert!(self.is_allocated());
        (hash % self.buckets.len() as u64) as usize
    }

    /// Links a new entry at the head of `bucket`'s chain and returns the
    /// bucket it ended up in.
    ///
    /// A free slot is reused when one exists. Otherwise, if the arena is
    /// full, the table grows first, which moves `hash` to a different
    /// bucket; the returned bucket reflects that, and callers chaining
    /// several inserts for the same hash must pass it to the next call.
    pub fn insert(&mut self, hash: u64, key: K, value: V, mut bucket: usize) -> usize {
        debug_assert!(self.is_allocated());
        debug_assert_eq!(bucket, self.bucket_for(hash));

        let reuse = self.free_head;
        if reuse.is_none() && self.slots.len() == self.buckets.len() {
            self.grow();
            bucket = self.bucket_for(hash);
        }

        let slot = Slot::Occupied {
            hash,
            next: self.buckets[bucket],
            key,
            value,
        };
        let index = match reuse {
            Some(index) => {
                log::trace!("reusing free slot {index}");
                self.free_head = self.slots[index].next();
                self.free_count -= 1;
                self.slots[index] = slot;
                index
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        };
        self.buckets[bucket] = Some(index);
        bucket
    }

    #[cold]
    fn grow(&mut self) {
        let Some(new_size) = grown_size(self.slots.len()) else {
            panic!("capacity overflow");
        };
        self.rebuild(new_size, None);
    }

    /// Reallocates the bucket array to `new_size` and relinks every chain.
    ///
    /// Slots stay at their indices, free ones included. `new_size` should be
    /// prime and must cover [`slots_used`](Self::slots_used).
    pub fn resize(&mut self, new_size: usize) {
        self.rebuild(new_size, None);
    }

    /// Like [`resize`](Self::resize), but recomputes every live hash with
    /// `hasher` before relinking.
    pub fn rehash(&mut self, new_size: usize, hasher: impl Fn(&K) -> u64) {
        self.rebuild(new_size, Some(&hasher));
    }

    fn rebuild(&mut self, new_size: usize, rehash: Option<&dyn Fn(&K) -> u64>) {
        assert!(
            new_size > 0 && new_size >= self.slots.len(),
            "cannot resize to {new_size} buckets with {} slots in use",
            self.slots.len()
        );
        log::debug!(
            "resizing table from {} to {} buckets ({} live, {} free)",
            self.buckets.len(),
            new_size,
            self.len(),
            self.free_count
        );

        let mut buckets = vec![None; new_size];
        self.slots.reserve_exact(new_size - self.slots.len());
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Slot::Occupied { hash, next, key, .. } = slot {
                if let Some(rehash) = rehash {
                    *hash = rehash(key);
                }
                let bucket = (*hash % new_size as u64) as usize;
                *next = buckets[bucket];
                buckets[bucket] = Some(index);
            }
        }
        self.buckets = buckets;
    }

    /// Makes room for `additional` more live entries without further growth.
    pub fn try_reserve(&mut self, additional: usize) -> Result<()> {
        let requested = self.len().saturating_add(additional);
        if requested > MAX_PRIME_ARRAY_LENGTH {
            return Err(Error::CapacityExhausted {
                requested,
                max: MAX_PRIME_ARRAY_LENGTH,
            });
        }

        if !self.is_allocated() {
            self.initialize(requested);
        } else if requested > self.buckets.len() {
            self.rebuild(get_prime(requested), None);
        }
        Ok(())
    }

    /// Walks the chain `hash` maps to, newest entry first.
    ///
    /// Entries with other hashes that share the bucket are included; callers
    /// filter on the yielded hash.
    pub fn chain(&self, hash: u64) -> Chain<'_, K, V> {
        let cursor = if self.is_allocated() {
            self.buckets[self.bucket_for(hash)]
        } else {
            None
        };
        Chain {
            slots: &self.slots,
            cursor,
        }
    }

    /// Walks the chain of an explicit bucket.
    pub fn bucket_chain(&self, bucket: usize) -> Chain<'_, K, V> {
        Chain {
            slots: &self.slots,
            cursor: self.buckets.get(bucket).copied().flatten(),
        }
    }

    /// Returns the index of the first (most recently linked) entry with
    /// `hash` whose key satisfies `eq`.
    pub fn find(&self, hash: u64, eq: impl Fn(&K) -> bool) -> Option<usize> {
        self.chain(hash)
            .find(|&(_, h, key, _)| h == hash && eq(key))
            .map(|(index, ..)| index)
    }

    /// Appends every matching index to `results` in chain order and returns
    /// `true` if at least one matched.
    pub fn find_all(&self, hash: u64, eq: impl Fn(&K) -> bool, results: &mut Vec<usize>) -> bool {
        let before = results.len();
        results.extend(
            self.chain(hash)
                .filter(|&(_, h, key, _)| h == hash && eq(key))
                .map(|(index, ..)| index),
        );
        results.len() > before
    }

    /// Returns `true` if some entry with `hash` satisfies `pred`.
    pub fn contains_where(&self, hash: u64, mut pred: impl FnMut(&K, &V) -> bool) -> bool {
        self.chain(hash)
            .any(|(_, h, key, value)| h == hash && pred(key, value))
    }

    /// Unlinks and frees every entry with `hash` that satisfies `pred`, in a
    /// single pass over the chain. Returns how many were removed.
    pub fn remove_where(&mut self, hash: u64, mut pred: impl FnMut(&K, &V) -> bool) -> usize {
        if !self.is_allocated() {
            return 0;
        }

        let bucket = self.bucket_for(hash);
        let mut previous: Option<usize> = None;
        let mut cursor = self.buckets[bucket];
        let mut removed = 0;

        while let Some(index) = cursor {
            let (next, matched) = match &self.slots[index] {
                Slot::Occupied {
                    hash: h,
                    next,
                    key,
                    value,
                } => (*next, *h == hash && pred(key, value)),
                Slot::Free { .. } => {
                    debug_assert!(false, "free slot {index} linked into bucket {bucket}");
                    break;
                }
            };

            if matched {
                match previous {
                    Some(previous) => self.slots[previous].set_next(next),
                    None => self.buckets[bucket] = next,
                }
                self.slots[index] = Slot::Free {
                    next: self.free_head,
                };
                self.free_head = Some(index);
                self.free_count += 1;
                removed += 1;
            } else {
                previous = Some(index);
            }
            cursor = next;
        }

        removed
    }

    /// Consumes the table into its live pairs, in slot order.
    pub fn into_pairs(self) -> Vec<(K, V)> {
        self.slots
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Occupied { key, value, .. } => Some((key, value)),
                Slot::Free { .. } => None,
            })
            .collect()
    }

    /// Returns the pair stored in a live slot.
    pub fn get(&self, index: usize) -> Option<(&K, &V)> {
        match self.slots.get(index)? {
            Slot::Occupied { key, value, .. } => Some((key, value)),
            Slot::Free { .. } => None,
        }
    }

    /// Iterates live entries in ascending slot order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.slots.iter().enumerate(),
        }
    }

    /// Removes every entry. Allocations are kept.
    pub fn clear(&mut self) {
        self.buckets.fill(None);
        self.slots.clear();
        self.free_head = None;
        self.free_count = 0;
    }

    /// Returns a histogram of chain lengths: entry `n` counts the buckets
    /// whose chain holds exactly `n` entries.
    #[cfg(feature = "stats")]
    pub fn chain_histogram(&self) -> Vec<usize> {
        let mut histogram = Vec::new();
        for bucket in 0..self.buckets.len() {
            let length = self.bucket_chain(bucket).count();
            if histogram.len() <= length {
                histogram.resize(length + 1, 0);
            }
            histogram[length] += 1;
        }
        histogram
    }
}

/// The bucket count to grow a full arena of `slots_used` slots to, or `None`
/// once the largest table prime is reached.
fn grown_size(slots_used: usize) -> Option<usize> {
    if slots_used >= MAX_PRIME_ARRAY_LENGTH {
        return None;
    }
    let new_size = expand_prime(slots_used);
    (new_size > slots_used && new_size <= MAX_PRIME_ARRAY_LENGTH).then_some(new_size)
}

/// Iterator over one bucket chain, yielding `(index, hash, key, value)`.
pub struct Chain<'a, K, V> {
    slots: &'a [Slot<K, V>],
    cursor: Option<usize>,
}

impl<'a, K, V> Iterator for Chain<'a, K, V> {
    type Item = (usize, u64, &'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let slots = self.slots;
        match &slots[index] {
            Slot::Occupied {
                hash,
                next,
                key,
                value,
            } => {
                self.cursor = *next;
                Some((index, *hash, key, value))
            }
            Slot::Free { .. } => {
                debug_assert!(false, "free slot {index} linked into a bucket chain");
                self.cursor = None;
                None
            }
        }
    }
}

/// Iterator over live entries in slot order, yielding `(index, key, value)`.
pub struct Iter<'a, K, V> {
    inner: core::iter::Enumerate<core::slice::Iter<'a, Slot<K, V>>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (usize, &'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        for (index, slot) in self.inner.by_ref() {
            if let Slot::Occupied { key, value, .. } = slot {
                return Some((index, key, value));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.inner.size_hint().1)
    }
}
