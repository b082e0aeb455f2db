//! Skip-list node structure.
//!
//! A node owns its key/value pair (immutable once linked), a tower of
//! atomic forward pointers sized exactly to the node's height, a
//! [`LinkState`] visibility word, and a mutex granting exclusive mutation
//! rights over the tower.
//!
//! The head sentinel is a keyless node at the maximum configured height. It
//! is the traversal origin and is never reachable through a forward
//! pointer, so search code only ever compares against data-node keys and
//! never consults sentinel key bytes.
//!
//! # Ownership
//!
//! Nodes are allocated with `Box::into_raw` and linked by raw pointers.
//! Because no removal protocol exists, every pointer stays valid until the
//! map drops; the map's `Drop` walks level 0 and reclaims each node.

use std::ptr;
use std::sync::atomic::AtomicPtr;

use parking_lot::Mutex;

use crate::linkstate::LinkState;

/// A single tower in the list: key, value, forward pointers, and the
/// concurrency-control words that guard them.
pub(crate) struct Node<K, V> {
    /// Key and value. `None` only for the head sentinel.
    entry: Option<(K, V)>,

    /// Forward pointers, one per level `0..height`. Entries start null and
    /// are only written under the splice protocol (own tower before
    /// publication, predecessor towers under their locks).
    next: Box<[AtomicPtr<Self>]>,

    /// Visibility flags: fully linked, marked.
    pub(crate) state: LinkState,

    /// Exclusive mutation rights over this node's forward-pointer array.
    /// Held only for the duration of a splice touching this node as a
    /// predecessor.
    pub(crate) lock: Mutex<()>,
}

impl<K, V> Node<K, V> {
    /// Allocate a data node of the given tower height, returning a raw
    /// pointer owned by the list.
    pub(crate) fn alloc(key: K, value: V, height: usize) -> *mut Self {
        debug_assert!(height >= 1, "a node participates in at least level 0");

        Box::into_raw(Box::new(Self {
            entry: Some((key, value)),
            next: Self::null_tower(height),
            state: LinkState::new(),
            lock: Mutex::new(()),
        }))
    }

    /// Allocate the head sentinel at the maximum height, born fully linked.
    pub(crate) fn alloc_head(max_height: usize) -> *mut Self {
        Box::into_raw(Box::new(Self {
            entry: None,
            next: Self::null_tower(max_height),
            state: LinkState::linked(),
            lock: Mutex::new(()),
        }))
    }

    fn null_tower(height: usize) -> Box<[AtomicPtr<Self>]> {
        (0..height).map(|_| AtomicPtr::new(ptr::null_mut())).collect()
    }

    /// Number of levels this node participates in.
    #[inline]
    pub(crate) fn height(&self) -> usize {
        self.next.len()
    }

    /// Forward pointer at `level` (must be below this node's height).
    #[inline]
    pub(crate) fn forward(&self, level: usize) -> &AtomicPtr<Self> {
        &self.next[level]
    }

    /// Key of a data node.
    ///
    /// The head sentinel is the traversal origin and never reachable
    /// through a forward pointer, so search code never calls this on it.
    #[inline]
    pub(crate) fn key(&self) -> &K {
        match &self.entry {
            Some((key, _)) => key,
            None => unreachable!("head sentinel has no key"),
        }
    }

    /// Value of a data node.
    #[inline]
    pub(crate) fn value(&self) -> &V {
        match &self.entry {
            Some((_, value)) => value,
            None => unreachable!("head sentinel has no value"),
        }
    }
}
