use alloc::vec::Vec;
use core::fmt::Debug;
use core::hash::Hash;
use core::hash::Hasher;

use crate::comparer::Comparer;
use crate::comparer::DefaultComparer;
use crate::error::Error;
use crate::error::Result;
use crate::hash_table::Chain;
use crate::hash_table::HashTable;
use crate::hash_table::Slot;

/// A hash table in which one key may hold any number of values.
///
/// Every value is its own chained entry; values of one key share a hash and
/// therefore a bucket chain. Keys and values are compared through two
/// injected [`Comparer`]s, `KC` for keys and `VC` for values.
///
/// # Ordering
///
/// - [`get`](Self::get) and [`get_all`](Self::get_all) follow chain order:
///   the newest value comes first until the table grows. A resize relinks
///   chains in descending slot order, and slots are recycled through a
///   free list, so after churn "first" is not necessarily "newest".
/// - [`iter`](Self::iter) and [`keys`](Self::keys) follow slot order, which
///   is neither insertion order nor bucket order.
///
/// # Equality
///
/// `PartialEq` and `Hash` are structural: two maps are equal only if their
/// bucket arrays, slot arenas (free slots included), and free lists match.
/// Maps with the same logical content built through different histories
/// can compare unequal; use [`content_eq`](Self::content_eq) to compare
/// key to value multisets instead.
///
/// # Examples
///
/// ```rust
/// use multi_hash::MultiMap;
///
/// let mut map = MultiMap::new();
/// map.add(1, "a");
/// map.add(1, "b");
/// map.add(2, "c");
///
/// assert_eq!(map.len(), 3);
/// assert_eq!(map.get(&1), Some(&"b"));
/// assert_eq!(map.get_all(&1).collect::<Vec<_>>(), [&"b", &"a"]);
/// assert_eq!(map.remove(&1), 2);
/// assert!(!map.contains_key(&1));
/// ```
#[derive(Clone)]
pub struct MultiMap<K, V, KC = DefaultComparer, VC = DefaultComparer> {
    table: HashTable<K, V>,
    key_comparer: KC,
    value_comparer: VC,
    version: u64,
}

impl<K, V, KC, VC> Debug for MultiMap<K, V, KC, VC>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V> MultiMap<K, V>
where
    K: Hash + Eq,
    V: Hash + Eq,
{
    /// Creates an empty map using [`DefaultComparer`] for keys and values.
    /// Nothing is allocated until the first insert.
    pub fn new() -> Self {
        Self::with_comparers(DefaultComparer::new(), DefaultComparer::new())
    }

    /// Creates an empty map with room for at least `capacity` values.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use multi_hash::MultiMap;
    ///
    /// let map: MultiMap<u32, u32> = MultiMap::with_capacity(100);
    /// assert_eq!(map.capacity(), 107);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_comparers(capacity, DefaultComparer::new(), DefaultComparer::new())
    }
}

impl<K, V, KC, VC> Default for MultiMap<K, V, KC, VC>
where
    KC: Default,
    VC: Default,
{
    fn default() -> Self {
        Self {
            table: HashTable::new(),
            key_comparer: KC::default(),
            value_comparer: VC::default(),
            version: 0,
        }
    }
}

impl<K, V, KC, VC> MultiMap<K, V, KC, VC>
where
    KC: Comparer<K>,
    VC: Comparer<V>,
{
    /// Creates an empty map with the given comparers.
    pub fn with_comparers(key_comparer: KC, value_comparer: VC) -> Self {
        Self::with_capacity_and_comparers(0, key_comparer, value_comparer)
    }

    /// Creates an empty map with the given comparers and room for at least
    /// `capacity` values. The bucket array is sized to the next table
    /// prime; a capacity of zero defers allocation.
    pub fn with_capacity_and_comparers(capacity: usize, key_comparer: KC, value_comparer: VC) -> Self {
        Self {
            table: HashTable::with_capacity(capacity),
            key_comparer,
            value_comparer,
            version: 0,
        }
    }

    /// Returns the number of values stored, counting every value of every
    /// key.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map holds no values.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the length of the bucket array (zero before the first
    /// insert).
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// The comparer applied to keys.
    pub fn key_comparer(&self) -> &KC {
        &self.key_comparer
    }

    /// The comparer applied to values.
    pub fn value_comparer(&self) -> &VC {
        &self.value_comparer
    }

    /// Returns the modification counter. It changes whenever content is
    /// added or removed, which is what invalidates a [`Cursor`].
    pub fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    fn touch(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    #[inline]
    fn hash_key(&self, key: &K) -> u64 {
        self.key_comparer.hash(key)
    }

    /// Adds `value` under `key`. Existing values of `key` are kept, even
    /// equal ones.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use multi_hash::MultiMap;
    ///
    /// let mut map = MultiMap::new();
    /// map.add("k", 1);
    /// map.add("k", 1);
    /// assert_eq!(map.count_values(&"k"), 2);
    /// ```
    pub fn add(&mut self, key: K, value: V) {
        let hash = self.hash_key(&key);
        self.table.ensure_allocated();
        let bucket = self.table.bucket_for(hash);
        self.table.insert(hash, key, value, bucket);
        self.touch();
    }

    /// Adds every value from `values` under `key`. The key is hashed once.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use multi_hash::MultiMap;
    ///
    /// let mut map = MultiMap::new();
    /// map.add_all("k", 0..10);
    /// assert_eq!(map.count_values(&"k"), 10);
    /// ```
    pub fn add_all<I>(&mut self, key: K, values: I)
    where
        K: Clone,
        I: IntoIterator<Item = V>,
    {
        let mut values = values.into_iter().peekable();
        if values.peek().is_none() {
            return;
        }

        let hash = self.hash_key(&key);
        self.table.ensure_allocated();
        let mut bucket = self.table.bucket_for(hash);
        for value in values {
            // An insert may grow the table, which moves the bucket.
            bucket = self.table.insert(hash, key.clone(), value, bucket);
            self.touch();
        }
    }

    /// Replaces every value of `key` with `value`. Returns how many values
    /// were replaced.
    pub fn set(&mut self, key: K, value: V) -> usize {
        let removed = self.remove(&key);
        self.add(key, value);
        removed
    }

    /// Replaces every value of `key` with `values`. An empty `values` leaves
    /// the key absent. Returns how many values were replaced.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use multi_hash::MultiMap;
    ///
    /// let mut map = MultiMap::new();
    /// map.add_all("k", [1, 2, 3]);
    /// assert_eq!(map.set_all("k", []), 3);
    /// assert!(!map.contains_key(&"k"));
    /// ```
    pub fn set_all<I>(&mut self, key: K, values: I) -> usize
    where
        K: Clone,
        I: IntoIterator<Item = V>,
    {
        let removed = self.remove(&key);
        self.add_all(key, values);
        removed
    }

    /// Removes every value of `key`. Returns how many were removed.
    pub fn remove(&mut self, key: &K) -> usize {
        let hash = self.hash_key(key);
        let key_comparer = &self.key_comparer;
        let removed = self
            .table
            .remove_where(hash, |k, _| key_comparer.equals(k, key));
        if removed > 0 {
            self.touch();
        }
        removed
    }

    /// Removes every `(key, value)` pair equal to the given one. Returns how
    /// many were removed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use multi_hash::MultiMap;
    ///
    /// let mut map = MultiMap::new();
    /// map.add_all("k", [1, 2, 1]);
    /// assert_eq!(map.remove_value(&"k", &1), 2);
    /// assert_eq!(map.get_all(&"k").collect::<Vec<_>>(), [&2]);
    /// ```
    pub fn remove_value(&mut self, key: &K, value: &V) -> usize {
        let hash = self.hash_key(key);
        let key_comparer = &self.key_comparer;
        let value_comparer = &self.value_comparer;
        let removed = self.table.remove_where(hash, |k, v| {
            key_comparer.equals(k, key) && value_comparer.equals(v, value)
        });
        if removed > 0 {
            self.touch();
        }
        removed
    }

    /// Returns `true` if `key` has at least one value.
    pub fn contains_key(&self, key: &K) -> bool {
        let hash = self.hash_key(key);
        self.table
            .contains_where(hash, |k, _| self.key_comparer.equals(k, key))
    }

    /// Returns `true` if `value` is stored under `key`.
    pub fn contains(&self, key: &K, value: &V) -> bool {
        let hash = self.hash_key(key);
        self.table.contains_where(hash, |k, v| {
            self.key_comparer.equals(k, key) && self.value_comparer.equals(v, value)
        })
    }

    /// Returns `true` if `value` is stored under any key. This scans the
    /// whole arena.
    pub fn contains_value(&self, value: &V) -> bool {
        self.values().any(|v| self.value_comparer.equals(v, value))
    }

    /// Returns the first value of `key` in chain order.
    ///
    /// That is the most recently added value unless the table has grown
    /// since; do not rely on it being the oldest.
    pub fn get(&self, key: &K) -> Option<&V> {
        let hash = self.hash_key(key);
        let index = self
            .table
            .find(hash, |k| self.key_comparer.equals(k, key))?;
        self.table.get(index).map(|(_, value)| value)
    }

    /// Iterates every value of `key` in chain order.
    pub fn get_all<'a>(&'a self, key: &'a K) -> GetAll<'a, K, V, KC> {
        let hash = self.hash_key(key);
        GetAll {
            chain: self.table.chain(hash),
            hash,
            key,
            key_comparer: &self.key_comparer,
        }
    }

    /// Extends `out` with every value of `key` in chain order. Returns
    /// `true` if there was at least one.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use multi_hash::MultiMap;
    ///
    /// let mut map = MultiMap::new();
    /// map.add_all(7, ["x", "y"]);
    ///
    /// let mut found: Vec<&&str> = Vec::new();
    /// assert!(map.get_all_into(&7, &mut found));
    /// assert!(!map.get_all_into(&8, &mut found));
    /// assert_eq!(found, [&"y", &"x"]);
    /// ```
    pub fn get_all_into<'a, E>(&'a self, key: &K, out: &mut E) -> bool
    where
        E: Extend<&'a V>,
    {
        let hash = self.hash_key(key);
        let mut indices = Vec::new();
        if !self
            .table
            .find_all(hash, |k| self.key_comparer.equals(k, key), &mut indices)
        {
            return false;
        }
        out.extend(
            indices
                .into_iter()
                .filter_map(|index| self.table.get(index))
                .map(|(_, value)| value),
        );
        true
    }

    /// Returns how many values `key` holds.
    pub fn count_values(&self, key: &K) -> usize {
        self.get_all(key).count()
    }

    /// Clones the values of `key`, in chain order, into the front of
    /// `dest` and returns how many were written.
    ///
    /// # Errors
    ///
    /// [`Error::InsufficientSpace`] if `dest` is too short; `dest` is left
    /// untouched.
    pub fn copy_values_to(&self, key: &K, dest: &mut [V]) -> Result<usize>
    where
        V: Clone,
    {
        let required = self.count_values(key);
        if required > dest.len() {
            return Err(Error::InsufficientSpace {
                required,
                available: dest.len(),
            });
        }
        for (slot, value) in dest.iter_mut().zip(self.get_all(key)) {
            slot.clone_from(value);
        }
        Ok(required)
    }

    /// Clones every pair, in slot order, into `dest` starting at `index`.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfRange`] if `index > dest.len()`, and
    /// [`Error::InsufficientSpace`] if the pairs do not fit after `index`.
    /// Nothing is written on error.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use multi_hash::Error;
    /// use multi_hash::MultiMap;
    ///
    /// let mut map = MultiMap::new();
    /// map.add_all(1, [10, 11]);
    ///
    /// let mut dest = [(0, 0); 3];
    /// assert_eq!(
    ///     map.copy_to(&mut dest, 2),
    ///     Err(Error::InsufficientSpace { required: 2, available: 1 })
    /// );
    /// assert_eq!(dest, [(0, 0); 3]);
    /// map.copy_to(&mut dest, 1).unwrap();
    /// assert_eq!(dest, [(0, 0), (1, 10), (1, 11)]);
    /// ```
    pub fn copy_to(&self, dest: &mut [(K, V)], index: usize) -> Result<()>
    where
        K: Clone,
        V: Clone,
    {
        if index > dest.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: dest.len(),
            });
        }
        let available = dest.len() - index;
        if available < self.len() {
            return Err(Error::InsufficientSpace {
                required: self.len(),
                available,
            });
        }
        for (slot, (key, value)) in dest[index..].iter_mut().zip(self.iter()) {
            *slot = (key.clone(), value.clone());
        }
        Ok(())
    }

    /// Iterates the distinct keys that hold at least one value, in slot
    /// order of each key's lowest slot.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use multi_hash::MultiMap;
    ///
    /// let mut map = MultiMap::new();
    /// map.add_all('a', [1, 2, 3]);
    /// map.add('b', 4);
    /// assert_eq!(map.keys().collect::<Vec<_>>(), [&'a', &'b']);
    /// ```
    pub fn keys(&self) -> Keys<'_, K, V, KC> {
        Keys {
            slots: self.table.slots().iter(),
            seen: HashTable::new(),
            key_comparer: &self.key_comparer,
        }
    }

    /// Removes every value. The bucket array keeps its size.
    pub fn clear(&mut self) {
        if self.table.slots_used() > 0 {
            self.table.clear();
            self.touch();
        }
    }

    /// Grows the table so that `additional` more values fit without a
    /// resize.
    ///
    /// # Panics
    ///
    /// Panics if the required size exceeds the largest table prime.
    pub fn reserve(&mut self, additional: usize) {
        if let Err(error) = self.table.try_reserve(additional) {
            panic!("{error}");
        }
    }

    /// Fallible [`reserve`](Self::reserve).
    ///
    /// # Errors
    ///
    /// [`Error::CapacityExhausted`] if the required size exceeds the largest
    /// table prime.
    pub fn try_reserve(&mut self, additional: usize) -> Result<()> {
        self.table.try_reserve(additional)
    }

    /// Compares logical content: same keys, and for each key the same
    /// multiset of values, regardless of layout or history. Keys are looked
    /// up in `other` with its own comparer; values are matched with this
    /// map's value comparer.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use multi_hash::MultiMap;
    ///
    /// let mut a = MultiMap::new();
    /// a.add_all(1, [1, 2]);
    /// let mut b = MultiMap::with_capacity(50);
    /// b.add_all(1, [2, 1]);
    ///
    /// assert!(a.content_eq(&b));
    /// assert_ne!(a, b);
    /// ```
    pub fn content_eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }

        self.keys().all(|key| {
            let mut theirs: Vec<&V> = other.get_all(key).collect();
            self.get_all(key).all(|mine| {
                match theirs
                    .iter()
                    .position(|v| self.value_comparer.equals(mine, v))
                {
                    Some(position) => {
                        theirs.swap_remove(position);
                        true
                    }
                    None => false,
                }
            }) && theirs.is_empty()
        })
    }

    /// Returns a histogram of bucket chain lengths: entry `n` counts the
    /// buckets whose chain holds `n` values.
    #[cfg(feature = "stats")]
    pub fn chain_histogram(&self) -> Vec<usize> {
        self.table.chain_histogram()
    }
}

impl<K, V, KC, VC> MultiMap<K, V, KC, VC> {
    /// Iterates every `(key, value)` pair in slot order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Iterates every value in slot order.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Starts a detached, fail-fast enumeration.
    ///
    /// Unlike [`iter`](Self::iter), a cursor does not borrow the map between
    /// steps; each [`Cursor::advance`] reborrows it. If the map is modified
    /// after the cursor was created, the next advance fails.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use multi_hash::Error;
    /// use multi_hash::MultiMap;
    ///
    /// let mut map = MultiMap::new();
    /// map.add_all(1, [1, 2]);
    ///
    /// let mut cursor = map.cursor();
    /// assert!(cursor.advance(&map).unwrap().is_some());
    /// map.add(2, 3);
    /// assert_eq!(cursor.advance(&map), Err(Error::ConcurrentModification));
    /// ```
    pub fn cursor(&self) -> Cursor {
        Cursor {
            position: 0,
            version: self.version,
        }
    }

    pub(crate) fn table(&self) -> &HashTable<K, V> {
        &self.table
    }

    pub(crate) fn into_parts(self) -> (HashTable<K, V>, KC, VC, u64) {
        (self.table, self.key_comparer, self.value_comparer, self.version)
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    fn slot_eq(&self, a: &Slot<K, V>, b: &Slot<K, V>) -> bool
    where
        KC: Comparer<K>,
        VC: Comparer<V>,
    {
        match (a, b) {
            (Slot::Free { next: a }, Slot::Free { next: b }) => a == b,
            (
                Slot::Occupied {
                    hash: hash_a,
                    next: next_a,
                    key: key_a,
                    value: value_a,
                },
                Slot::Occupied {
                    hash: hash_b,
                    next: next_b,
                    key: key_b,
                    value: value_b,
                },
            ) => {
                hash_a == hash_b
                    && next_a == next_b
                    && self.key_comparer.equals(key_a, key_b)
                    && self.value_comparer.equals(value_a, value_b)
            }
            _ => false,
        }
    }
}

impl<K, V, KC, VC> PartialEq for MultiMap<K, V, KC, VC>
where
    KC: Comparer<K> + PartialEq,
    VC: Comparer<V> + PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = (&self.table, &other.table);
        self.key_comparer == other.key_comparer
            && self.value_comparer == other.value_comparer
            && a.free_head() == b.free_head()
            && a.free_count() == b.free_count()
            && a.slots_used() == b.slots_used()
            && a.buckets() == b.buckets()
            && a
                .slots()
                .iter()
                .zip(b.slots())
                .all(|(x, y)| self.slot_eq(x, y))
    }
}

impl<K, V, KC, VC> Eq for MultiMap<K, V, KC, VC>
where
    KC: Comparer<K> + Eq,
    VC: Comparer<V> + Eq,
{
}

impl<K, V, KC, VC> Hash for MultiMap<K, V, KC, VC>
where
    KC: Comparer<K> + Hash,
    VC: Comparer<V> + Hash,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        Hash::hash(&self.key_comparer, state);
        Hash::hash(&self.value_comparer, state);
        self.table.free_head().hash(state);
        state.write_usize(self.table.free_count());
        state.write_usize(self.table.slots_used());
        self.table.buckets().hash(state);
        for slot in self.table.slots() {
            match slot {
                Slot::Free { next } => {
                    state.write_u8(0);
                    next.hash(state);
                }
                Slot::Occupied {
                    hash, next, value, ..
                } => {
                    state.write_u8(1);
                    state.write_u64(*hash);
                    next.hash(state);
                    state.write_u64(Comparer::hash(&self.value_comparer, value));
                }
            }
        }
    }
}

impl<K, V, KC, VC> Extend<(K, V)> for MultiMap<K, V, KC, VC>
where
    KC: Comparer<K>,
    VC: Comparer<V>,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (key, value) in iter {
            self.add(key, value);
        }
    }
}

impl<K, V, KC, VC> FromIterator<(K, V)> for MultiMap<K, V, KC, VC>
where
    KC: Comparer<K> + Default,
    VC: Comparer<V> + Default,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::default();
        map.extend(iter);
        map
    }
}

impl<'a, K, V, KC, VC> IntoIterator for &'a MultiMap<K, V, KC, VC> {
    type IntoIter = Iter<'a, K, V>;
    type Item = (&'a K, &'a V);

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An iterator over the `(key, value)` pairs of a [`MultiMap`], in slot
/// order.
pub struct Iter<'a, K, V> {
    inner: crate::hash_table::Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, k, v)| (k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// An iterator over the values of a [`MultiMap`], in slot order.
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }
}

/// An iterator over the values of one key, in chain order.
///
/// Created by [`MultiMap::get_all`].
pub struct GetAll<'a, K, V, KC> {
    chain: Chain<'a, K, V>,
    hash: u64,
    key: &'a K,
    key_comparer: &'a KC,
}

impl<'a, K, V, KC> Iterator for GetAll<'a, K, V, KC>
where
    KC: Comparer<K>,
{
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        for (_, hash, key, value) in self.chain.by_ref() {
            if hash == self.hash && self.key_comparer.equals(key, self.key) {
                return Some(value);
            }
        }
        None
    }
}

/// An iterator over the distinct keys of a [`MultiMap`].
///
/// Created by [`MultiMap::keys`]. A key is yielded at its lowest live slot.
/// Yielded keys are remembered in a private table searched with the stored
/// hash and the key comparer, so each slot costs one chain lookup.
pub struct Keys<'a, K, V, KC> {
    slots: core::slice::Iter<'a, Slot<K, V>>,
    seen: HashTable<&'a K, ()>,
    key_comparer: &'a KC,
}

impl<'a, K, V, KC> Iterator for Keys<'a, K, V, KC>
where
    KC: Comparer<K>,
{
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        for slot in self.slots.by_ref() {
            let Slot::Occupied { hash, key, .. } = slot else {
                continue;
            };
            let key_comparer = self.key_comparer;
            if self
                .seen
                .find(*hash, |seen| key_comparer.equals(seen, key))
                .is_some()
            {
                continue;
            }
            self.seen.ensure_allocated();
            let bucket = self.seen.bucket_for(*hash);
            self.seen.insert(*hash, key, (), bucket);
            return Some(key);
        }
        None
    }
}

/// A detached, fail-fast position in a [`MultiMap`]'s slot arena.
///
/// Created by [`MultiMap::cursor`]. The cursor remembers the map's version
/// at creation; advancing it after any insert or removal returns
/// [`Error::ConcurrentModification`]. There is no reset; create a new
/// cursor to enumerate again.
///
/// A cursor records a version and a slot position, not which map it came
/// from. Advancing it over a different map whose version happens to match,
/// such as an unmodified clone, succeeds and walks that map's slots from the
/// saved position. Always advance a cursor over the map that created it.
#[derive(Clone, Debug)]
pub struct Cursor {
    position: usize,
    version: u64,
}

impl Cursor {
    /// Returns the next live pair, `Ok(None)` at the end.
    ///
    /// # Errors
    ///
    /// [`Error::ConcurrentModification`] if `map`'s version differs from the
    /// one recorded when the cursor was created. `map` is not checked to be
    /// the map that created the cursor.
    pub fn advance<'a, K, V, KC, VC>(
        &mut self,
        map: &'a MultiMap<K, V, KC, VC>,
    ) -> Result<Option<(&'a K, &'a V)>> {
        if self.version != map.version {
            return Err(Error::ConcurrentModification);
        }

        let slots = map.table.slots();
        while self.position < slots.len() {
            let index = self.position;
            self.position += 1;
            if let Slot::Occupied { key, value, .. } = &slots[index] {
                return Ok(Some((key, value)));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use alloc::collections::BTreeSet;
    use alloc::format;
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec;
    use core::hash::BuildHasher;

    use rand::Rng;
    use rand::SeedableRng;
    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use rand::rngs::SmallRng;
    use siphasher::sip::SipHasher;

    use super::*;
    use crate::hash_table::tests::assert_invariants;

    #[derive(Clone, PartialEq)]
    struct SipComparer {
        k1: u64,
        k2: u64,
    }

    impl SipComparer {
        fn random() -> Self {
            let mut rng = OsRng;
            Self {
                k1: rng.try_next_u64().unwrap_or(0),
                k2: rng.try_next_u64().unwrap_or(0),
            }
        }
    }

    impl BuildHasher for SipComparer {
        type Hasher = SipHasher;

        fn build_hasher(&self) -> Self::Hasher {
            SipHasher::new_with_keys(self.k1, self.k2)
        }
    }

    impl<T: Hash + Eq> Comparer<T> for SipComparer {
        fn equals(&self, a: &T, b: &T) -> bool {
            a == b
        }

        fn hash(&self, value: &T) -> u64 {
            self.hash_one(value)
        }
    }

    /// Sends every key to the same bucket.
    #[derive(Clone, Default, PartialEq)]
    struct CollidingComparer;

    impl<T: Eq> Comparer<T> for CollidingComparer {
        fn equals(&self, a: &T, b: &T) -> bool {
            a == b
        }

        fn hash(&self, _value: &T) -> u64 {
            0
        }
    }

    fn sorted<T: Ord + Clone>(values: impl IntoIterator<Item = T>) -> Vec<T> {
        let mut v: Vec<T> = values.into_iter().collect();
        v.sort();
        v
    }

    #[test]
    fn scenario_add_get_remove() {
        let mut map = MultiMap::new();
        map.add(1, "a");
        map.add(1, "b");
        map.add(2, "c");

        assert_eq!(map.len(), 3);
        let keys: BTreeSet<_> = map.keys().copied().collect();
        assert_eq!(keys, BTreeSet::from([1, 2]));
        assert_eq!(map.get_all(&1).collect::<Vec<_>>(), [&"b", &"a"]);
        assert_eq!(map.get(&1), Some(&"b"));

        assert_eq!(map.remove(&1), 2);
        assert_eq!(map.len(), 1);
        assert!(!map.contains_key(&1));
        assert!(map.contains_key(&2));
        assert_invariants(map.table());
    }

    #[test]
    fn new_map_is_unallocated() {
        let map: MultiMap<u64, u64> = MultiMap::new();
        assert!(map.is_empty());
        assert_eq!(map.capacity(), 0);
        assert_eq!(map.get(&1), None);
        assert_eq!(map.get_all(&1).count(), 0);
        assert!(!map.contains_key(&1));
        assert_eq!(map.keys().count(), 0);
    }

    #[test]
    fn add_then_lookup_with_sip_hashing() {
        let comparer = SipComparer::random();
        let mut map = MultiMap::with_comparers(comparer.clone(), comparer);
        for k in 0..500u64 {
            map.add(k % 50, k);
        }
        assert_eq!(map.len(), 500);
        for k in 0..50u64 {
            let expected: Vec<u64> = (0..10).map(|i| k + 50 * i).collect();
            assert_eq!(sorted(map.get_all(&k).copied()), expected);
            assert!(map.contains(&k, &(k + 50)));
            assert!(!map.contains(&k, &(k + 1)));
        }
        assert_eq!(map.keys().count(), 50);
        assert_invariants(map.table());
    }

    #[test]
    fn add_all_survives_growth_mid_sequence() {
        let mut map = MultiMap::new();
        map.add(0u32, 0u32);
        // Starts at capacity 3, so this crosses several resizes.
        map.add_all(1, 0..100);
        assert_eq!(map.count_values(&1), 100);
        assert_eq!(sorted(map.get_all(&1).copied()), (0..100).collect::<Vec<_>>());
        assert_eq!(map.get(&0), Some(&0));
        assert_invariants(map.table());
    }

    #[test]
    fn add_all_empty_is_noop() {
        let mut map: MultiMap<u32, u32> = MultiMap::new();
        map.add_all(1, []);
        assert_eq!(map.version(), 0);
        assert_eq!(map.capacity(), 0);
        assert!(!map.contains_key(&1));
    }

    #[test]
    fn chain_order_after_free_slot_reuse_and_resize() {
        let mut map = MultiMap::new();
        map.add_all("k", ["a", "b", "c"]);
        assert_eq!(map.remove_value(&"k", &"a"), 1);
        map.add("k", "d");
        assert_eq!(map.get_all(&"k").collect::<Vec<_>>(), [&"d", &"c", &"b"]);
        assert_eq!(map.get(&"k"), Some(&"d"));

        map.add("k", "e");
        assert_eq!(map.capacity(), 7);
        assert_eq!(
            map.get_all(&"k").collect::<Vec<_>>(),
            [&"e", &"c", &"b", &"d"]
        );
    }

    #[test]
    fn set_replaces_all_values() {
        let mut map = MultiMap::new();
        map.add_all("k", [1, 2, 3]);
        map.add("other", 9);

        assert_eq!(map.set("k", 4), 3);
        assert_eq!(map.get_all(&"k").collect::<Vec<_>>(), [&4]);
        assert_eq!(map.set("fresh", 5), 0);
        assert_eq!(map.get(&"fresh"), Some(&5));

        assert_eq!(map.set_all("k", [7, 8]), 1);
        assert_eq!(sorted(map.get_all(&"k").copied()), [7, 8]);
        assert_eq!(map.get(&"other"), Some(&9));
    }

    #[test]
    fn remove_value_only_touches_matching_pairs() {
        let mut map = MultiMap::new();
        map.add_all(1, ["x", "y", "x"]);
        map.add(2, "x");

        assert_eq!(map.remove_value(&1, &"z"), 0);
        assert_eq!(map.remove_value(&1, &"x"), 2);
        assert_eq!(map.get_all(&1).collect::<Vec<_>>(), [&"y"]);
        assert!(map.contains(&2, &"x"));
        assert!(map.contains_value(&"x"));
        assert!(!map.contains_value(&"q"));
        assert_invariants(map.table());
    }

    #[test]
    fn remove_missing_key_keeps_version() {
        let mut map = MultiMap::new();
        map.add(1, 1);
        let version = map.version();
        assert_eq!(map.remove(&2), 0);
        assert_eq!(map.version(), version);
    }

    #[test]
    fn keys_are_distinct_in_slot_order() {
        let mut map = MultiMap::with_comparers(CollidingComparer, CollidingComparer);
        map.add('b', 1);
        map.add('a', 2);
        map.add('b', 3);
        map.add('c', 4);
        map.add('a', 5);
        assert_eq!(map.keys().collect::<Vec<_>>(), [&'b', &'a', &'c']);

        // Free slot 0, then let 'c' take it: 'c' now sorts first.
        map.remove_value(&'b', &1);
        map.add('c', 6);
        assert_eq!(map.keys().collect::<Vec<_>>(), [&'c', &'a', &'b']);
        assert_invariants(map.table());
    }

    #[test]
    fn keys_stay_linear_under_one_heavy_key() {
        let mut map = MultiMap::new();
        map.add(1u32, u32::MAX);
        map.add_all(1, 0..40_000u32);
        map.add(2, 0);
        map.add_all(1, 0..10);
        assert_eq!(map.keys().collect::<Vec<_>>(), [&1, &2]);

        // Free the first slot: key 1 is now first seen at a later slot.
        assert_eq!(map.remove_value(&1, &u32::MAX), 1);
        map.add(3, 0);
        assert_eq!(map.keys().collect::<Vec<_>>(), [&3, &1, &2]);
    }

    #[test]
    fn iteration_covers_every_live_pair() {
        let mut map = MultiMap::new();
        for k in 0..20u32 {
            map.add(k % 4, k);
        }
        map.remove(&2);

        let pairs = sorted(map.iter().map(|(&k, &v)| (k, v)));
        let expected = sorted((0..20u32).filter(|k| k % 4 != 2).map(|k| (k % 4, k)));
        assert_eq!(pairs, expected);
        assert_eq!(map.values().count(), 15);
        assert_eq!((&map).into_iter().count(), 15);
    }

    #[test]
    fn get_all_into_appends() {
        let mut map = MultiMap::new();
        map.add_all(3, [30, 31]);

        let mut out = vec![&0];
        assert!(map.get_all_into(&3, &mut out));
        assert_eq!(out, [&0, &31, &30]);
        assert!(!map.get_all_into(&4, &mut out));
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn copy_values_to_is_all_or_nothing() {
        let mut map = MultiMap::new();
        map.add_all("k", [1, 2, 3]);

        let mut short = [0; 2];
        assert_eq!(
            map.copy_values_to(&"k", &mut short),
            Err(Error::InsufficientSpace {
                required: 3,
                available: 2,
            })
        );
        assert_eq!(short, [0, 0]);

        let mut dest = [0; 4];
        assert_eq!(map.copy_values_to(&"k", &mut dest), Ok(3));
        assert_eq!(dest, [3, 2, 1, 0]);
        assert_eq!(map.copy_values_to(&"missing", &mut []), Ok(0));
    }

    #[test]
    fn copy_to_checks_index() {
        let mut map = MultiMap::new();
        map.add(1, 1);
        let mut dest = [(0, 0); 2];
        assert_eq!(
            map.copy_to(&mut dest, 3),
            Err(Error::IndexOutOfRange { index: 3, len: 2 })
        );
        assert_eq!(
            map.copy_to(&mut dest, 2),
            Err(Error::InsufficientSpace {
                required: 1,
                available: 0,
            })
        );
        assert_eq!(dest, [(0, 0); 2]);
    }

    #[test]
    fn cursor_walks_slot_order() {
        let mut map = MultiMap::new();
        map.add_all(1, [10, 11]);
        map.add(2, 20);
        map.remove_value(&1, &10);

        let mut cursor = map.cursor();
        let mut seen = Vec::new();
        while let Some((&k, &v)) = cursor.advance(&map).unwrap() {
            seen.push((k, v));
        }
        assert_eq!(seen, [(1, 11), (2, 20)]);
        assert_eq!(cursor.advance(&map), Ok(None));
    }

    #[test]
    fn cursor_fails_after_each_kind_of_mutation() {
        let mutations: [fn(&mut MultiMap<u32, u32>); 6] = [
            |m| m.add(9, 9),
            |m| m.add_all(9, [1, 2]),
            |m| {
                m.remove(&1);
            },
            |m| {
                m.remove_value(&1, &1);
            },
            |m| {
                m.set(1, 5);
            },
            |m| m.clear(),
        ];

        for mutate in mutations {
            let mut map = MultiMap::new();
            map.add_all(1, [1, 2]);
            let mut cursor = map.cursor();
            assert!(cursor.advance(&map).unwrap().is_some());

            mutate(&mut map);
            assert_eq!(cursor.advance(&map), Err(Error::ConcurrentModification));

            let mut fresh = map.cursor();
            assert!(fresh.advance(&map).is_ok());
        }
    }

    #[test]
    fn cursor_checks_version_not_map() {
        let mut map = MultiMap::new();
        map.add_all(1u32, [10u32, 11]);
        let mut copy = map.clone();

        // A clone shares the version, so the cursor accepts it.
        let mut cursor = copy.cursor();
        assert_eq!(cursor.advance(&map), Ok(Some((&1, &10))));
        assert_eq!(cursor.advance(&copy), Ok(Some((&1, &11))));

        copy.add(2, 20);
        assert_eq!(cursor.advance(&copy), Err(Error::ConcurrentModification));
        assert_eq!(cursor.advance(&map), Ok(None));

        map.add(3, 30);
        assert_eq!(cursor.advance(&map), Err(Error::ConcurrentModification));
    }

    #[test]
    fn clear_keeps_capacity_and_resets() {
        let mut map = MultiMap::new();
        map.add_all(1, 0..30);
        let capacity = map.capacity();
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.capacity(), capacity);
        assert!(!map.contains_key(&1));
        map.add(1, 1);
        assert_eq!(map.get(&1), Some(&1));
        assert_invariants(map.table());
    }

    #[test]
    fn reserve_avoids_growth() {
        let mut map = MultiMap::new();
        map.reserve(1000);
        let capacity = map.capacity();
        assert!(capacity >= 1000);
        map.add_all(0u32, 0..1000u32);
        assert_eq!(map.capacity(), capacity);
        assert!(map.try_reserve(usize::MAX).is_err());
    }

    #[test]
    fn clone_is_independent() {
        let mut original = MultiMap::new();
        original.add_all(1, [1, 2]);
        original.remove_value(&1, &1);

        let mut copy = original.clone();
        assert_eq!(copy, original);

        original.add(2, 2);
        assert!(!copy.contains_key(&2));
        copy.add(3, 3);
        assert!(!original.contains_key(&3));
        assert_ne!(copy, original);
    }

    #[test]
    fn structural_equality_depends_on_history() {
        let mut a = MultiMap::new();
        a.add(1, 1);
        a.add(2, 2);

        let mut b = MultiMap::new();
        b.add(2, 2);
        b.add(1, 1);

        let mut c = MultiMap::new();
        c.add(1, 1);
        c.add(2, 2);

        assert_eq!(a, c);
        assert_ne!(a, b);
        assert!(a.content_eq(&b));

        // A freed slot makes the layout differ even with equal content.
        c.add(3, 3);
        c.remove(&3);
        assert_ne!(a, c);
        assert!(a.content_eq(&c));
    }

    #[test]
    fn equal_maps_hash_equally() {
        let state = SipComparer::random();

        let mut a = MultiMap::new();
        a.add_all("k".to_string(), [1, 2, 3]);
        let b = a.clone();
        assert_eq!(state.hash_one(&a), state.hash_one(&b));

        a.add("j".to_string(), 4);
        assert_ne!(state.hash_one(&a), state.hash_one(&b));
    }

    #[test]
    fn comparer_mismatch_breaks_equality() {
        let a: MultiMap<u8, u8> =
            MultiMap::with_comparers(DefaultComparer::with_seed(1), DefaultComparer::new());
        let b: MultiMap<u8, u8> = MultiMap::new();
        assert_ne!(a, b);
        assert!(a.content_eq(&b));
    }

    #[test]
    fn content_eq_counts_multiplicity() {
        let mut a = MultiMap::new();
        a.add_all(1, [1, 1, 2]);
        let mut b = MultiMap::new();
        b.add_all(1, [1, 2, 2]);
        assert!(!a.content_eq(&b));

        let mut c = MultiMap::new();
        c.add_all(1, [2, 1, 1]);
        assert!(a.content_eq(&c));
    }

    #[test]
    fn collisions_resolve_by_equality() {
        let mut map = MultiMap::with_comparers(CollidingComparer, CollidingComparer);
        for k in 0..40u32 {
            map.add(k, k * 10);
        }
        for k in 0..40u32 {
            assert_eq!(map.get(&k), Some(&(k * 10)));
        }
        assert_eq!(map.remove(&7), 1);
        assert!(!map.contains_key(&7));
        assert_eq!(map.len(), 39);
        assert_invariants(map.table());
    }

    #[test]
    fn churn_preserves_value_multisets() {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut map = MultiMap::new();
        let mut model: Vec<Vec<u32>> = vec![Vec::new(); 16];

        for step in 0..3000u32 {
            let key = rng.random_range(0..16usize);
            match rng.random_range(0..10) {
                0..6 => {
                    map.add(key, step);
                    model[key].push(step);
                }
                6..8 => {
                    assert_eq!(map.remove(&key), model[key].len());
                    model[key].clear();
                }
                _ => {
                    if let Some(&value) = model[key].first() {
                        assert_eq!(map.remove_value(&key, &value), 1);
                        model[key].remove(0);
                    }
                }
            }
        }

        assert!(map.capacity() > 3);
        for (key, values) in model.iter().enumerate() {
            assert_eq!(sorted(map.get_all(&key).copied()), sorted(values.iter().copied()));
            assert_eq!(map.contains_key(&key), !values.is_empty());
        }
        assert_eq!(map.len(), model.iter().map(Vec::len).sum::<usize>());
        assert_invariants(map.table());
    }

    #[test]
    fn collect_and_debug() {
        let map: MultiMap<String, u8> = [("a".to_string(), 1), ("a".to_string(), 2)]
            .into_iter()
            .collect();
        assert_eq!(map.count_values(&"a".to_string()), 2);
        assert_eq!(format!("{map:?}"), r#"{"a": 1, "a": 2}"#);
        let empty: MultiMap<String, u8> = MultiMap::default();
        assert_eq!(format!("{empty:?}"), "{}");
    }

    #[cfg(feature = "stats")]
    #[test]
    fn chain_histogram_sums_to_len() {
        let mut map = MultiMap::new();
        map.add_all(1u8, 0..10u8);
        map.add(2, 0);
        let histogram = map.chain_histogram();
        let total: usize = histogram.iter().enumerate().map(|(n, c)| n * c).sum();
        assert_eq!(total, map.len());
    }
}
