//! Concurrent skip-list map.
//!
//! [`SkipListMap`] is a sorted associative container supporting
//! insert-if-absent and point lookup from any number of threads at once.
//!
//! # Concurrency Model
//!
//! 1. Readers: a single downward pass over the tower structure, no locks.
//!    A node counts as present only when its fully-linked flag is set and
//!    its marked flag is clear.
//! 2. Writers: optimistic lock coupling. Search without locks, then lock
//!    each *distinct* predecessor in ascending level order, re-validate the
//!    snapshot under those locks, and splice. Any validation failure
//!    releases every lock and restarts from the search.
//!
//! No list-wide lock exists: inserts of distinct keys that do not share a
//! locked predecessor proceed fully in parallel.
//!
//! # Memory
//!
//! Nodes are never unlinked (removal is a reserved extension point), so
//! every node allocated by an insert stays valid until the map drops. The
//! `Drop` impl walks level 0 and frees the chain.

use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::AtomicUsize;

use parking_lot::MutexGuard;

use crate::comparator::{Comparator, NaturalOrder};
use crate::level::{GeometricLevel, LevelGenerator};
use crate::node::Node;
use crate::ordering::{GROW_ORD, READ_ORD, RELAXED, WRITE_ORD};
use crate::tracing_helpers::{debug_log, trace_log};

#[cfg(all(loom, test))]
mod loom_tests;

/// Default coin success probability for tower height draws.
pub const DEFAULT_PROBABILITY: f64 = 0.25;

/// Default maximum tower height.
///
/// With p = 0.25 the expected height for n elements is log4(n); 32 levels
/// comfortably cover tens of millions of elements without nearing the cap.
pub const DEFAULT_MAX_HEIGHT: usize = 32;

// ============================================================================
//  Configuration
// ============================================================================

/// Construction-time tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Coin success probability for the geometric height draw, in (0, 1).
    pub probability: f64,

    /// Hard ceiling on tower height (and therefore list height), >= 1.
    pub max_height: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            probability: DEFAULT_PROBABILITY,
            max_height: DEFAULT_MAX_HEIGHT,
        }
    }
}

impl Config {
    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the probability lies outside (0, 1) or
    /// the maximum height is zero.
    pub fn validate(self) -> Result<(), ConfigError> {
        if !(self.probability > 0.0 && self.probability < 1.0) {
            return Err(ConfigError::InvalidProbability(self.probability));
        }

        if self.max_height == 0 {
            return Err(ConfigError::InvalidMaxHeight(self.max_height));
        }

        Ok(())
    }
}

// ============================================================================
//  Errors
// ============================================================================

/// Errors rejected at construction time.
///
/// This is the only condition that aborts construction; duplicate keys and
/// missing keys are normal results, never errors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    /// The coin probability must lie strictly between 0 and 1.
    InvalidProbability(f64),

    /// The maximum tower height must be at least 1.
    InvalidMaxHeight(usize),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidProbability(p) => {
                write!(f, "fan-out probability {p} is outside (0, 1)")
            }

            Self::InvalidMaxHeight(h) => {
                write!(f, "maximum tower height {h} must be at least 1")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// The bounded-retry insert exhausted its retry budget under contention.
///
/// Distinct from both the duplicate (`Ok(false)`) and success (`Ok(true)`)
/// outcomes: the key may or may not be present when this is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentionError {
    attempts: usize,
}

impl ContentionError {
    /// Number of full search-validate passes that were attempted.
    #[must_use]
    pub const fn attempts(&self) -> usize {
        self.attempts
    }
}

impl fmt::Display for ContentionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "insert abandoned after {} contended attempts",
            self.attempts
        )
    }
}

impl std::error::Error for ContentionError {}

// ============================================================================
//  Search snapshot
// ============================================================================

/// Result of one downward predecessor search.
///
/// For every level, `preds[level]` is the last node strictly before the
/// search key and `succs[level]` the first node at or after it (null at
/// the end of a level). Levels above the active height keep the head /
/// null defaults, so a tower that grows the list finds its predecessors
/// ready. `found` is the highest level at which an exact match was seen.
struct TowerSearch<K, V> {
    preds: Vec<*mut Node<K, V>>,
    succs: Vec<*mut Node<K, V>>,
    found: Option<usize>,
}

/// Outcome of a single optimistic insert pass.
enum Attempt<K, V> {
    /// Spliced and published.
    Inserted,

    /// An equal, unmarked key is already fully linked.
    Duplicate,

    /// Snapshot went stale (validation failed or a marked duplicate was
    /// seen); the key and value are handed back for the next pass.
    Retry(K, V),
}

// ============================================================================
//  SkipListMap
// ============================================================================

/// A concurrent sorted map with insert-if-absent semantics.
///
/// Ordering and equality come solely from the injected [`Comparator`]
/// (natural `Ord` order by default). See the [crate docs](crate) for the
/// concurrency contract.
pub struct SkipListMap<K, V, C = NaturalOrder> {
    /// Keyless sentinel at `max_height`; the traversal origin. Never freed
    /// before the map.
    head: *mut Node<K, V>,

    /// Number of active levels. Starts at 1, grows by at most one per
    /// insertion, never shrinks, never exceeds `max_height`.
    height: AtomicUsize,

    /// Live element count. Approximate under concurrency.
    len: AtomicUsize,

    max_height: usize,

    comparator: C,

    levels: Box<dyn LevelGenerator>,
}

// SAFETY: the raw `head` pointer is what blocks the auto impls. All nodes
// are owned by the map, shared only behind atomics, and mutated only under
// per-node locks; `K`/`V` are handed across threads by value (insert) and
// by shared reference (get/iter), hence the `Send + Sync` bounds on both.
unsafe impl<K: Send + Sync, V: Send + Sync, C: Send + Sync> Send for SkipListMap<K, V, C> {}

// SAFETY: see the `Send` impl; all `&self` operations are internally
// synchronized by the protocol described in the module docs.
unsafe impl<K: Send + Sync, V: Send + Sync, C: Send + Sync> Sync for SkipListMap<K, V, C> {}

impl<K: Ord, V> SkipListMap<K, V> {
    /// Create a map with default configuration: natural key order,
    /// p = 0.25, maximum height 32.
    #[must_use]
    pub fn new() -> Self {
        let config = Config::default();
        let levels = Box::new(GeometricLevel::new(config.probability));

        Self::from_parts(config, NaturalOrder, levels)
    }

    /// Create a map with the given configuration and natural key order.
    ///
    /// # Errors
    /// Returns [`ConfigError`] for an out-of-range probability or a zero
    /// maximum height.
    pub fn with_config(config: Config) -> Result<Self, ConfigError> {
        Self::with_comparator(config, NaturalOrder)
    }
}

impl<K: Ord, V> Default for SkipListMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, C: Comparator<K>> SkipListMap<K, V, C> {
    /// Create a map ordered by `comparator`.
    ///
    /// Plain ordering closures work through
    /// [`FnComparator`](crate::FnComparator):
    ///
    /// ```rust
    /// use towermap::{Config, FnComparator, SkipListMap};
    ///
    /// let map = SkipListMap::with_comparator(
    ///     Config::default(),
    ///     FnComparator(|a: &u32, b: &u32| b.cmp(a)), // descending
    /// ).unwrap();
    ///
    /// assert!(map.try_insert(1, ()));
    /// assert!(map.try_insert(2, ()));
    /// let keys: Vec<u32> = map.iter().map(|(k, _)| *k).collect();
    /// assert_eq!(keys, [2, 1]);
    /// ```
    ///
    /// # Errors
    /// Returns [`ConfigError`] for an invalid configuration.
    pub fn with_comparator(config: Config, comparator: C) -> Result<Self, ConfigError> {
        config.validate()?;
        let levels = Box::new(GeometricLevel::new(config.probability));

        Ok(Self::from_parts(config, comparator, levels))
    }

    /// Create a map with an injected randomness source for tower heights.
    ///
    /// Deterministic generators ([`FixedLevel`](crate::FixedLevel),
    /// [`SequenceLevel`](crate::SequenceLevel)) force exact tower shapes in
    /// tests.
    ///
    /// # Errors
    /// Returns [`ConfigError`] for an invalid configuration. The probability
    /// is still validated even though the injected generator may ignore it.
    pub fn with_level_generator(
        config: Config,
        comparator: C,
        levels: Box<dyn LevelGenerator>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self::from_parts(config, comparator, levels))
    }

    fn from_parts(config: Config, comparator: C, levels: Box<dyn LevelGenerator>) -> Self {
        Self {
            head: Node::alloc_head(config.max_height),
            height: AtomicUsize::new(1),
            len: AtomicUsize::new(0),
            max_height: config.max_height,
            comparator,
            levels,
        }
    }

    // ========================================================================
    //  Read path
    // ========================================================================

    /// Look up a key without taking any lock.
    ///
    /// Returns the value of the fully-linked, unmarked node with an equal
    /// key, or `None`. Never blocks and never conflicts structurally with
    /// concurrent inserts.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        let search = self.find_tower(key);
        let level = search.found?;

        // SAFETY: nodes are never freed before the map drops, so every
        // pointer recorded by the search stays valid for `&self`.
        let node = unsafe { &*search.succs[level] };

        if node.state.is_fully_linked() && !node.state.is_marked() {
            Some(node.value())
        } else {
            None
        }
    }

    /// Whether a fully-linked, unmarked node with this key exists.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Number of completed insertions visible at the time of the read.
    ///
    /// Approximate under concurrency: no snapshot isolation is implied.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(RELAXED)
    }

    /// Whether the map has no visible entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current number of active levels (1 when empty, grows with taller
    /// towers, never exceeds [`Config::max_height`]).
    #[must_use]
    pub fn height(&self) -> usize {
        self.height.load(READ_ORD)
    }

    /// The configured hard ceiling on tower height.
    #[must_use]
    pub const fn max_height(&self) -> usize {
        self.max_height
    }

    /// Iterate entries in key order along level 0.
    ///
    /// Weakly consistent: entries inserted while iterating may or may not
    /// be observed; entries returned were fully linked when visited.
    pub fn iter(&self) -> Iter<'_, K, V> {
        // SAFETY: head lives as long as the map.
        let first = unsafe { &*self.head }.forward(0).load(READ_ORD);

        Iter {
            next: first,
            _map: PhantomData,
        }
    }

    // ========================================================================
    //  Write path
    // ========================================================================

    /// Insert `value` under `key` if and only if the key is absent.
    ///
    /// Returns `true` when the key was absent and is now present, `false`
    /// when an equal key already exists (the existing value is never
    /// overwritten; `key` and `value` are dropped).
    ///
    /// Retries without bound when a concurrent insert invalidates the
    /// search snapshot. Bounded retries are expected under contention; a
    /// sustained storm on one key region can in principle starve a caller.
    /// Use [`try_insert_bounded`](Self::try_insert_bounded) where that must
    /// surface as an outcome instead.
    pub fn try_insert(&self, key: K, value: V) -> bool {
        let top_level = self.draw_level();
        let mut key = key;
        let mut value = value;

        loop {
            match self.attempt_insert(key, value, top_level) {
                Attempt::Inserted => return true,
                Attempt::Duplicate => return false,

                Attempt::Retry(k, v) => {
                    trace_log!(top_level, "insert snapshot stale, retrying");
                    key = k;
                    value = v;
                }
            }
        }
    }

    /// [`try_insert`](Self::try_insert) with a retry budget.
    ///
    /// Performs at most `max_retries + 1` search-validate passes. The same
    /// protocol, validation, and visibility guarantees apply.
    ///
    /// # Errors
    /// Returns [`ContentionError`] once the budget is exhausted. This is a
    /// distinct outcome: the key may or may not be present afterwards, and
    /// it must never be conflated with the duplicate (`Ok(false)`) result.
    pub fn try_insert_bounded(
        &self,
        key: K,
        value: V,
        max_retries: usize,
    ) -> Result<bool, ContentionError> {
        let top_level = self.draw_level();
        let mut key = key;
        let mut value = value;
        let mut attempts: usize = 0;

        loop {
            attempts += 1;

            match self.attempt_insert(key, value, top_level) {
                Attempt::Inserted => return Ok(true),
                Attempt::Duplicate => return Ok(false),

                Attempt::Retry(k, v) => {
                    if attempts > max_retries {
                        debug_log!(attempts, "insert retry budget exhausted");
                        return Err(ContentionError { attempts });
                    }

                    key = k;
                    value = v;
                }
            }
        }
    }

    // ========================================================================
    //  Internals
    // ========================================================================

    /// Draw the top level for a new tower, clamped so the list height can
    /// grow by at most one and never exceeds the maximum.
    fn draw_level(&self) -> usize {
        let height = self.height();

        self.levels
            .next_level(height, self.max_height)
            .min(height)
            .min(self.max_height - 1)
    }

    /// One downward pass: record, per level, the last node strictly before
    /// `key` and the first node at or after it.
    ///
    /// Shared by lookup and insert. Lock-free: forward pointers are read
    /// with Acquire and all reachable nodes have complete towers (the
    /// splice protocol installs a node's own pointers before publishing
    /// it), so the walk never dereferences an incomplete tower.
    fn find_tower(&self, key: &K) -> TowerSearch<K, V> {
        let mut preds: Vec<*mut Node<K, V>> = vec![self.head; self.max_height];
        let mut succs: Vec<*mut Node<K, V>> = vec![ptr::null_mut(); self.max_height];
        let mut found: Option<usize> = None;

        let mut pred: *mut Node<K, V> = self.head;

        for level in (0..self.height()).rev() {
            // SAFETY: pred is head or a node reached through a published
            // forward pointer; both outlive `&self`.
            let mut curr: *mut Node<K, V> = unsafe { &*pred }.forward(level).load(READ_ORD);

            while !curr.is_null() {
                // SAFETY: as above; published pointers are valid.
                let curr_ref = unsafe { &*curr };

                match self.comparator.compare(curr_ref.key(), key) {
                    CmpOrdering::Less => {
                        pred = curr;
                        curr = curr_ref.forward(level).load(READ_ORD);
                    }

                    CmpOrdering::Equal => {
                        if found.is_none() {
                            found = Some(level);
                        }
                        break;
                    }

                    CmpOrdering::Greater => break,
                }
            }

            preds[level] = pred;
            succs[level] = curr;
        }

        TowerSearch {
            preds,
            succs,
            found,
        }
    }

    /// One full optimistic insert pass: search, duplicate check, lock
    /// coupling, validation, splice.
    fn attempt_insert(&self, key: K, value: V, top_level: usize) -> Attempt<K, V> {
        let search = self.find_tower(&key);

        if let Some(level) = search.found {
            // SAFETY: search pointers stay valid for `&self`.
            let existing = unsafe { &*search.succs[level] };

            if existing.state.is_marked() {
                // A removal is in flight; the snapshot cannot be trusted.
                return Attempt::Retry(key, value);
            }

            // The racing insert that created this node may not have
            // published it yet. Reporting "absent" here would let two
            // inserts of one key both return true.
            existing.state.wait_fully_linked();
            return Attempt::Duplicate;
        }

        // Lock each distinct predecessor in ascending level order. The same
        // node is frequently the predecessor at several consecutive levels;
        // locking it once keeps the protocol deadlock-free.
        let mut guards: Vec<MutexGuard<'_, ()>> = Vec::with_capacity(top_level + 1);
        let mut prev_pred: *mut Node<K, V> = ptr::null_mut();

        for level in 0..=top_level {
            let pred = search.preds[level];
            let succ = search.succs[level];

            // SAFETY: search pointers stay valid for `&self`.
            let pred_ref = unsafe { &*pred };

            if pred != prev_pred {
                guards.push(pred_ref.lock.lock());
                prev_pred = pred;
            }

            // Validate under the lock: the snapshot still describes the
            // structure at this level.
            let succ_marked = !succ.is_null() && unsafe { &*succ }.state.is_marked();

            if pred_ref.state.is_marked()
                || succ_marked
                || pred_ref.forward(level).load(READ_ORD) != succ
            {
                // Full restart; guards drop here, releasing every lock in
                // acquisition order.
                return Attempt::Retry(key, value);
            }
        }

        // Validation passed at every level; splice. The new node's own
        // pointers go in first so that the instant a predecessor pointer
        // makes it reachable, its forward chain is already complete.
        let node = Node::alloc(key, value, top_level + 1);

        // SAFETY: freshly allocated, not yet reachable by any other thread.
        let node_ref = unsafe { &*node };

        for level in 0..=top_level {
            node_ref.forward(level).store(search.succs[level], RELAXED);
        }

        for level in 0..=top_level {
            // SAFETY: pred is locked by us; only the lock holder mutates
            // forward pointers.
            unsafe { &*search.preds[level] }
                .forward(level)
                .store(node, WRITE_ORD);
        }

        node_ref.state.set_fully_linked();
        self.len.fetch_add(1, RELAXED);
        self.height.fetch_max(top_level + 1, GROW_ORD);

        trace_log!(top_level, "spliced new tower");

        Attempt::Inserted
        // guards drop here: locks release in the order they were taken
    }
}

impl<K, V, C> fmt::Debug for SkipListMap<K, V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkipListMap")
            .field("len", &self.len.load(RELAXED))
            .field("height", &self.height.load(READ_ORD))
            .field("max_height", &self.max_height)
            .finish_non_exhaustive()
    }
}

impl<K, V, C> Drop for SkipListMap<K, V, C> {
    fn drop(&mut self) {
        // Exclusive access: walk the level-0 chain (every node is on it)
        // and free head plus each data node.
        let mut curr = self.head;

        while !curr.is_null() {
            // SAFETY: level-0 links every allocated node exactly once, and
            // nothing else can touch the map during drop.
            let next = unsafe { &*curr }.forward(0).load(RELAXED);
            drop(unsafe { Box::from_raw(curr) });
            curr = next;
        }
    }
}

// ============================================================================
//  Iteration
// ============================================================================

/// Level-0, key-order iterator over a [`SkipListMap`].
///
/// Weakly consistent; see [`SkipListMap::iter`].
#[derive(Debug)]
pub struct Iter<'a, K, V> {
    next: *mut Node<K, V>,
    _map: PhantomData<&'a Node<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while !self.next.is_null() {
            // SAFETY: published nodes outlive the map borrow `'a`.
            let node: &'a Node<K, V> = unsafe { &*self.next };
            self.next = node.forward(0).load(READ_ORD);

            if node.state.is_fully_linked() && !node.state.is_marked() {
                return Some((node.key(), node.value()));
            }
        }

        None
    }
}

impl<'a, K, V, C: Comparator<K>> IntoIterator for &'a SkipListMap<K, V, C> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ============================================================================
//  Tests
// ============================================================================
