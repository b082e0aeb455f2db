//! Injectable total order over keys.
//!
//! The comparator supplied at construction is the *only* source of ordering
//! and equality in the map. Keys need no `Eq`/`Hash` bounds: two keys are
//! the same entry exactly when the comparator says `Ordering::Equal`.

use std::cmp::Ordering;

/// A total order over `K`.
///
/// Implementations must be consistent (a total order): for the map's
/// invariants to hold, `compare` must be antisymmetric and transitive for
/// the lifetime of the map.
pub trait Comparator<K>: Send + Sync {
    /// Compare two keys.
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

/// The natural `Ord` order of the key type. Default comparator.
#[derive(Debug, Default, Clone, Copy)]
pub struct NaturalOrder;

impl<K: Ord> Comparator<K> for NaturalOrder {
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

/// Adapter turning an ordering closure into a [`Comparator`].
///
/// ```rust
/// use towermap::{Config, FnComparator, SkipListMap};
///
/// let descending = FnComparator(|a: &u32, b: &u32| b.cmp(a));
/// let map = SkipListMap::with_comparator(Config::default(), descending).unwrap();
///
/// assert!(map.try_insert(1, ()));
/// assert!(map.try_insert(2, ()));
/// let keys: Vec<u32> = map.iter().map(|(k, _)| *k).collect();
/// assert_eq!(keys, [2, 1]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FnComparator<F>(pub F);

impl<K, F> Comparator<K> for FnComparator<F>
where
    F: Fn(&K, &K) -> Ordering + Send + Sync,
{
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        (self.0)(a, b)
    }
}
