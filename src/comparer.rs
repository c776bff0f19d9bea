use core::hash::BuildHasher;
use core::hash::Hash;

/// An equality capability injected into a [`MultiMap`](crate::MultiMap).
///
/// A comparer decides when two keys (or two values) are the same and
/// produces the hash used to place keys into buckets. The two operations
/// must agree: values that compare equal must hash equally.
///
/// # Examples
///
/// ```rust
/// use multi_hash::Comparer;
/// use multi_hash::DefaultComparer;
/// use multi_hash::MultiMap;
///
/// #[derive(Clone, PartialEq)]
/// struct IgnoreAsciiCase;
///
/// impl Comparer<String> for IgnoreAsciiCase {
///     fn equals(&self, a: &String, b: &String) -> bool {
///         a.eq_ignore_ascii_case(b)
///     }
///
///     fn hash(&self, value: &String) -> u64 {
///         let lower = value.to_ascii_lowercase();
///         Comparer::<String>::hash(&DefaultComparer::new(), &lower)
///     }
/// }
///
/// let mut map = MultiMap::with_comparers(IgnoreAsciiCase, DefaultComparer::new());
/// map.add("Key".to_string(), 1);
/// map.add("KEY".to_string(), 2);
/// assert_eq!(map.count_values(&"key".to_string()), 2);
/// ```
pub trait Comparer<T: ?Sized> {
    /// Returns `true` if `a` and `b` are equal under this comparer.
    fn equals(&self, a: &T, b: &T) -> bool;

    /// Hashes `value` consistently with [`equals`](Comparer::equals).
    fn hash(&self, value: &T) -> u64;
}

/// The comparer used when none is supplied: `Eq` for equality and a seeded
/// hasher for hashing.
///
/// With the `foldhash` feature the hash is `foldhash`'s fixed-state hasher
/// keyed by the seed; otherwise the standard library's `DefaultHasher` is
/// fed the seed before the value. Two default comparers are equal when
/// their seeds are.
#[cfg(any(feature = "std", feature = "foldhash"))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DefaultComparer {
    seed: u64,
}

#[cfg(any(feature = "std", feature = "foldhash"))]
impl DefaultComparer {
    /// Creates a comparer with seed `0`.
    pub const fn new() -> Self {
        Self { seed: 0 }
    }

    /// Creates a comparer whose hashes are keyed by `seed`.
    pub const fn with_seed(seed: u64) -> Self {
        Self { seed }
    }

    /// Returns the seed keying this comparer's hashes.
    pub const fn seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(any(feature = "std", feature = "foldhash"))]
impl<T> Comparer<T> for DefaultComparer
where
    T: ?Sized + Hash + Eq,
{
    #[inline]
    fn equals(&self, a: &T, b: &T) -> bool {
        a == b
    }

    #[inline]
    fn hash(&self, value: &T) -> u64 {
        cfg_if::cfg_if! {
            if #[cfg(feature = "foldhash")] {
                foldhash::fast::FixedState::with_seed(self.seed).hash_one(value)
            } else {
                core::hash::BuildHasherDefault::<std::hash::DefaultHasher>::default()
                    .hash_one((self.seed, value))
            }
        }
    }
}

#[cfg(not(any(feature = "std", feature = "foldhash")))]
compile_error!("enable the `std` or `foldhash` feature to provide `DefaultComparer`");
