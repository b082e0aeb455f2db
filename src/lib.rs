//! # `towermap`
//!
//! A concurrent skip-list map: a probabilistically balanced sorted
//! associative container with lock-free point lookups and fine-grained
//! locked insert-if-absent.
//!
//! Writers lock only the predecessor nodes they are about to splice into
//! (optimistic lock coupling with validation and retry). Readers never take
//! a lock: they rely on release-ordered pointer publication and a per-node
//! `fully linked` flag that makes a half-built tower invisible.
//!
//! | Operation | Guarantee |
//! |-----------|-----------|
//! | `get` | Lock-free, never blocks |
//! | `try_insert` | Insert-if-absent, locks only distinct predecessors |
//! | `try_insert_bounded` | Same protocol, capped retries with a distinct contention outcome |
//! | `len` | Approximate under concurrency |
//! | `iter` | Weakly consistent, level-0 key order |
//! | Removal | Not implemented (nodes carry a `marked` hook for a future protocol) |
//!
//! ## Thread Safety
//!
//! `SkipListMap<K, V>` is `Send + Sync` when `K` and `V` are `Send + Sync`.
//! All operations take `&self`; share the map behind an `Arc` or a scoped
//! thread borrow:
//!
//! ```rust
//! use towermap::SkipListMap;
//!
//! let map: SkipListMap<u64, &str> = SkipListMap::new();
//!
//! assert!(map.try_insert(7, "seven"));
//! assert!(!map.try_insert(7, "again")); // insert-if-absent, no overwrite
//! assert_eq!(map.get(&7), Some(&"seven"));
//! assert_eq!(map.get(&8), None);
//! ```
//!
//! ## Design
//!
//! Each node owns a tower of forward pointers, one per level it participates
//! in. Tower heights are drawn from a geometric distribution (default
//! success probability 0.25, injectable via [`LevelGenerator`]). A single
//! downward predecessor search serves both lookup and insert. Inserts lock
//! each distinct predecessor in ascending level order, re-validate the
//! search snapshot under those locks, and splice successor-pointers-first so
//! a reader can never step into an incomplete tower.
//!
//! Ordering and equality come solely from the injected [`Comparator`]
//! (natural `Ord` order by default).

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod comparator;
pub mod level;
pub mod linkstate;
pub mod list;
mod node;
pub mod ordering;

mod tracing_helpers;

// Re-export main types for convenience
pub use comparator::{Comparator, FnComparator, NaturalOrder};
pub use level::{FixedLevel, GeometricLevel, LevelGenerator, SequenceLevel};
pub use list::{Config, ConfigError, ContentionError, SkipListMap};
