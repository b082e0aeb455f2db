//! Per-node link state for concurrent visibility control.
//!
//! [`LinkState`] packs a node's two concurrency flags into a single
//! `AtomicU8`:
//!
//! - **fully linked**: every forward pointer of the node's tower is
//!   installed and the node is safe for readers to traverse through.
//! - **marked**: logical removal is in progress. No removal protocol is
//!   implemented yet; the flag exists so that lookups and insert validation
//!   already honor it, which keeps a future unlink protocol from changing
//!   the read path.
//!
//! # Concurrency Model
//!
//! 1. Writers install a node's forward pointers, then publish the fully
//!    linked flag with a Release store.
//! 2. Readers load the flag with Acquire before trusting the node's key,
//!    value, or tower. A node observed without the flag is treated as
//!    absent.
//! 3. A racing insert of the same key spins on [`LinkState::wait_fully_linked`]
//!    rather than reporting absence during the narrow window between splice
//!    and publication.

use std::sync::atomic::AtomicU8;

use crate::ordering::{READ_ORD, RELAXED, WRITE_ORD};

/// Fully-linked bit: all forward pointers installed, node visible.
const FULLY_LINKED_BIT: u8 = 1 << 0;

/// Marked bit: logical removal in progress, ignore in lookups.
const MARKED_BIT: u8 = 1 << 1;

/// Spin iterations between yields while waiting for a racing insert.
const SPINS_BEFORE_YIELD: usize = 64;

/// A node's atomic visibility state.
///
/// # Example
///
/// ```rust
/// use towermap::linkstate::LinkState;
///
/// let state = LinkState::new();
/// assert!(!state.is_fully_linked());
/// assert!(!state.is_marked());
///
/// state.set_fully_linked();
/// assert!(state.is_fully_linked());
/// ```
#[derive(Debug)]
pub struct LinkState {
    value: AtomicU8,
}

impl LinkState {
    /// Create the state of a freshly allocated, not-yet-spliced node.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: AtomicU8::new(0),
        }
    }

    /// Create the state of a sentinel that is visible from construction.
    ///
    /// The head node never goes through the splice protocol, so it is born
    /// fully linked.
    #[must_use]
    pub const fn linked() -> Self {
        Self {
            value: AtomicU8::new(FULLY_LINKED_BIT),
        }
    }

    /// Check whether every forward pointer of this node is installed.
    ///
    /// Acquire load: pairs with the Release store in [`set_fully_linked`]
    /// so a reader that sees the flag also sees the completed tower.
    ///
    /// [`set_fully_linked`]: LinkState::set_fully_linked
    #[inline]
    #[must_use]
    pub fn is_fully_linked(&self) -> bool {
        (self.value.load(READ_ORD) & FULLY_LINKED_BIT) != 0
    }

    /// Check whether logical removal is in progress.
    #[inline]
    #[must_use]
    pub fn is_marked(&self) -> bool {
        (self.value.load(READ_ORD) & MARKED_BIT) != 0
    }

    /// Publish the node: all forward pointers are installed.
    ///
    /// Must only be called by the inserting thread, after the last
    /// predecessor pointer store, while the predecessor locks are still
    /// held.
    #[inline]
    pub fn set_fully_linked(&self) {
        self.value.fetch_or(FULLY_LINKED_BIT, WRITE_ORD);
    }

    /// Mark the node as being logically removed.
    ///
    /// Reserved extension point: no caller in the crate removes nodes yet,
    /// but lookup and insert validation already treat a marked node as
    /// dead, so a future removal protocol only has to mark and unlink.
    #[inline]
    pub fn set_marked(&self) {
        self.value.fetch_or(MARKED_BIT, WRITE_ORD);
    }

    /// Spin until the node becomes fully linked.
    ///
    /// Used when an insert finds its key already spliced by a racing
    /// thread: that node is reachable but may not be published yet, and
    /// reporting "absent" in that window would break the insert-if-absent
    /// contract. The wait is bounded by the racing insert's own critical
    /// section (it holds its predecessor locks only while splicing).
    pub fn wait_fully_linked(&self) {
        let mut spins: usize = 0;

        while !self.is_fully_linked() {
            spins += 1;

            if spins % SPINS_BEFORE_YIELD == 0 {
                std::thread::yield_now();
            } else {
                std::hint::spin_loop();
            }
        }
    }

    /// Get the raw state byte.
    #[inline]
    #[must_use]
    pub fn value(&self) -> u8 {
        self.value.load(RELAXED)
    }
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new()
    }
}
