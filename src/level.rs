//! Tower leveling policy.
//!
//! Every insertion draws a random tower height. The draw is geometric: keep
//! flipping a biased coin (success probability `p`, default 0.25) and count
//! consecutive successes. The draw is capped at the current list height —
//! the list grows by at most one level per insertion — and at one below the
//! configured maximum height, so no tower ever exceeds the bound.
//!
//! The generator is injected at construction rather than pulled from
//! process-wide state, so tests can supply deterministic sequences to force
//! exact tower shapes ([`FixedLevel`], [`SequenceLevel`]).

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicU64, AtomicUsize};

use crate::ordering::RELAXED;

/// Coin flips are decided on the top 24 bits of each xorshift draw.
const FLIP_BITS: u32 = 24;

/// Source of random tower top levels.
///
/// `next_level` returns the *top level index* of a new tower (a return of
/// `0` means a height-1 tower). Implementations must stay within
/// `[0, min(current_height, max_height - 1)]`; the map clamps the result as
/// well, so a misbehaving generator degrades balance but never breaks the
/// height invariants.
pub trait LevelGenerator: Send + Sync {
    /// Draw the top level for the next insertion.
    fn next_level(&self, current_height: usize, max_height: usize) -> usize;
}

// ============================================================================
//  GeometricLevel
// ============================================================================

/// Default generator: geometric draw over a shared xorshift64 stream.
///
/// The stream state is a single relaxed atomic. Concurrent draws may read
/// the same state and write racing successors; a lost update merely repeats
/// part of the stream, which is harmless for balancing and keeps the hot
/// insert path free of CAS loops.
#[derive(Debug)]
pub struct GeometricLevel {
    state: AtomicU64,

    /// A flip succeeds when a 24-bit draw falls below this threshold.
    threshold: u32,
}

impl GeometricLevel {
    /// Create a generator with the given coin success probability.
    ///
    /// `probability` must lie in the open interval (0, 1); construction
    /// through [`Config`](crate::Config) validates this.
    #[must_use]
    pub fn new(probability: f64) -> Self {
        debug_assert!(
            probability > 0.0 && probability < 1.0,
            "probability must be validated by Config"
        );

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let threshold: u32 = (probability * f64::from(1u32 << FLIP_BITS)) as u32;

        Self {
            state: AtomicU64::new(Self::seed()),
            threshold,
        }
    }

    /// Seed from the standard library's per-process random hasher state.
    fn seed() -> u64 {
        let hasher = RandomState::new().build_hasher();

        // xorshift cycles on zero; force a nonzero seed.
        hasher.finish() | 1
    }

    /// Advance the xorshift64 stream and return the next draw.
    fn next_u64(&self) -> u64 {
        let mut x: u64 = self.state.load(RELAXED);

        if x == 0 {
            x = 0x9E37_79B9_7F4A_7C15;
        }

        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;

        self.state.store(x, RELAXED);
        x
    }

    /// One biased coin flip.
    fn flip(&self) -> bool {
        let draw: u32 = (self.next_u64() >> (64 - FLIP_BITS)) as u32;

        draw < self.threshold
    }
}

impl LevelGenerator for GeometricLevel {
    fn next_level(&self, current_height: usize, max_height: usize) -> usize {
        let cap: usize = current_height.min(max_height - 1);
        let mut level: usize = 0;

        while level < cap && self.flip() {
            level += 1;
        }

        level
    }
}

// ============================================================================
//  Deterministic generators (for tests and reproducible benchmarks)
// ============================================================================

/// Always draws the same top level (clamped to the allowed range).
///
/// With a level higher than the current height, every insertion grows the
/// list by exactly one level until the maximum is reached — useful for
/// exercising the height-growth path deterministically.
#[derive(Debug, Clone, Copy)]
pub struct FixedLevel(pub usize);

impl LevelGenerator for FixedLevel {
    fn next_level(&self, current_height: usize, max_height: usize) -> usize {
        self.0.min(current_height).min(max_height - 1)
    }
}

/// Replays a fixed sequence of top levels, then repeats the last entry.
#[derive(Debug)]
pub struct SequenceLevel {
    levels: Vec<usize>,
    pos: AtomicUsize,
}

impl SequenceLevel {
    /// Create a generator replaying `levels` in order.
    ///
    /// # Panics
    /// Panics if `levels` is empty.
    #[must_use]
    pub fn new(levels: Vec<usize>) -> Self {
        assert!(!levels.is_empty(), "SequenceLevel needs at least one level");

        Self {
            levels,
            pos: AtomicUsize::new(0),
        }
    }
}

impl LevelGenerator for SequenceLevel {
    fn next_level(&self, current_height: usize, max_height: usize) -> usize {
        let idx: usize = self.pos.fetch_add(1, RELAXED).min(self.levels.len() - 1);

        self.levels[idx].min(current_height).min(max_height - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometric_respects_caps() {
        let generator = GeometricLevel::new(0.25);

        for _ in 0..10_000 {
            let level = generator.next_level(4, 8);
            assert!(level <= 4);
        }

        // Height above the maximum: the max-height cap wins.
        for _ in 0..10_000 {
            let level = generator.next_level(100, 8);
            assert!(level <= 7);
        }
    }

    #[test]
    fn test_geometric_distribution_is_biased_low() {
        let generator = GeometricLevel::new(0.25);
        const DRAWS: usize = 100_000;

        let mut zeros: usize = 0;
        for _ in 0..DRAWS {
            if generator.next_level(31, 32) == 0 {
                zeros += 1;
            }
        }

        // P(level == 0) = 0.75; allow a generous tolerance.
        let fraction = zeros as f64 / DRAWS as f64;
        assert!(
            (0.70..=0.80).contains(&fraction),
            "level-0 fraction {fraction} outside expected band"
        );
    }

    #[test]
    fn test_geometric_reaches_upper_levels() {
        let generator = GeometricLevel::new(0.25);

        let mut seen_tall = false;
        for _ in 0..100_000 {
            if generator.next_level(31, 32) >= 3 {
                seen_tall = true;
                break;
            }
        }

        // P(level >= 3) ~ 1.5%; 100k draws miss it with negligible odds.
        assert!(seen_tall, "no tall tower in 100k draws");
    }

    #[test]
    fn test_fixed_level_clamps() {
        let generator = FixedLevel(10);

        assert_eq!(generator.next_level(2, 32), 2);
        assert_eq!(generator.next_level(20, 32), 10);
        assert_eq!(generator.next_level(20, 4), 3);
    }

    #[test]
    fn test_sequence_replays_then_repeats() {
        let generator = SequenceLevel::new(vec![0, 2, 1]);

        assert_eq!(generator.next_level(31, 32), 0);
        assert_eq!(generator.next_level(31, 32), 2);
        assert_eq!(generator.next_level(31, 32), 1);
        assert_eq!(generator.next_level(31, 32), 1);
        assert_eq!(generator.next_level(31, 32), 1);
    }

    #[test]
    #[should_panic(expected = "at least one level")]
    fn test_sequence_rejects_empty() {
        let _ = SequenceLevel::new(Vec::new());
    }
}
