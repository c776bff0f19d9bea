//! Prime table sizes and the doubling growth policy.
//!
//! Bucket arrays are always sized to a prime so that `hash % capacity`
//! spreads keys whose hashes share low bits. None of the tabled primes (and
//! none produced by the fallback search) satisfy `(p - 1) % HASH_PRIME == 0`,
//! which keeps them away from the step used by secondary hashing schemes.

/// Largest bucket array length the table will grow to.
pub const MAX_PRIME_ARRAY_LENGTH: usize = 0x7FEF_FFFD;

const HASH_PRIME: usize = 101;

/// Upper bound of the fallback primality scan.
const SCAN_LIMIT: usize = i32::MAX as usize;

#[rustfmt::skip]
const PRIMES: &[usize] = &[
    3, 7, 11, 17, 23, 29, 37, 47, 59, 71, 89, 107, 131, 163, 197, 239, 293, 353, 431, 521, 631,
    761, 919, 1103, 1327, 1597, 1931, 2333, 2801, 3371, 4049, 4861, 5839, 7013, 8419, 10103,
    12143, 14591, 17519, 21023, 25229, 30293, 36353, 43627, 52361, 62851, 75431, 90523, 108631,
    130363, 156437, 187751, 225307, 270371, 324449, 389357, 467237, 560689, 672827, 807403,
    968897, 1162687, 1395263, 1674319, 2009191, 2411033, 2893249, 3471899, 4166287, 4999559,
    5999471, 7199369,
];

/// Returns `true` if `candidate` is prime.
pub fn is_prime(candidate: usize) -> bool {
    if candidate & 1 == 0 {
        return candidate == 2;
    }
    if candidate < 3 {
        return false;
    }

    let limit = candidate.isqrt();
    let mut divisor = 3;
    while divisor <= limit {
        if candidate % divisor == 0 {
            return false;
        }
        divisor += 2;
    }
    true
}

/// Returns the smallest usable prime table size that is at least `min`.
///
/// Sizes come from a fixed table first; larger requests fall back to a
/// linear scan over odd numbers. If the scan runs past the representable
/// range, `min` is returned unchanged and the caller must treat it as
/// capacity exhaustion.
///
/// # Examples
///
/// ```rust
/// use multi_hash::primes::get_prime;
///
/// assert_eq!(get_prime(0), 3);
/// assert_eq!(get_prime(8), 11);
/// assert_eq!(get_prime(11), 11);
/// ```
pub fn get_prime(min: usize) -> usize {
    if let Some(&prime) = PRIMES.iter().find(|&&p| p >= min) {
        return prime;
    }

    let mut candidate = min | 1;
    while candidate < SCAN_LIMIT {
        if is_prime(candidate) && (candidate - 1) % HASH_PRIME != 0 {
            return candidate;
        }
        candidate += 2;
    }
    min
}

/// Returns the table size to grow to from `old_size`: the next prime at
/// least twice as large, clamped to [`MAX_PRIME_ARRAY_LENGTH`].
///
/// # Examples
///
/// ```rust
/// use multi_hash::primes::expand_prime;
///
/// assert_eq!(expand_prime(3), 7);
/// assert_eq!(expand_prime(7), 17);
/// ```
pub fn expand_prime(old_size: usize) -> usize {
    let new_size = old_size.saturating_mul(2);
    if new_size > MAX_PRIME_ARRAY_LENGTH && MAX_PRIME_ARRAY_LENGTH > old_size {
        debug_assert_eq!(MAX_PRIME_ARRAY_LENGTH, get_prime(MAX_PRIME_ARRAY_LENGTH));
        return MAX_PRIME_ARRAY_LENGTH;
    }
    get_prime(new_size)
}
