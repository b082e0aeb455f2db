//! Standard memory orderings for concurrent node access.
//!
//! These constants ensure consistent ordering usage across the codebase
//! and make the intent clear at each access point.

use std::sync::atomic::Ordering;

/// Ordering for reading forward pointers and link state during traversal.
/// Pairs with a writer's Release stores.
pub const READ_ORD: Ordering = Ordering::Acquire;

/// Ordering for publishing forward pointers and link state.
/// Pairs with a reader's Acquire loads.
pub const WRITE_ORD: Ordering = Ordering::Release;

/// Ordering for the list-height `fetch_max` when a taller tower lands.
/// Release half publishes the new top-level link, Acquire half lets the
/// grower observe earlier growth.
pub const GROW_ORD: Ordering = Ordering::AcqRel;

/// Ordering for stores that are not yet reachable by any other thread
/// (a new node's own tower before splice) and for statistics counters.
pub const RELAXED: Ordering = Ordering::Relaxed;
