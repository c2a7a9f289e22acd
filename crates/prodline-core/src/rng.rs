//! Deterministic PRNG for downtime sampling.
//!
//! Uses the SplitMix64 algorithm: fast, 8 bytes of state, excellent
//! statistical properties, and trivially serializable for snapshots.

/// SplitMix64 pseudo-random number generator.
///
/// Deterministic across platforms, so a seeded episode replays identically.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SimRng {
    state: u64,
}

impl SimRng {
    /// Create a new RNG with the given seed.
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform integer in `[lo, hi]` (inclusive). Returns `lo` when the range
    /// is degenerate. Rejection-free modulo is acceptable here: downtime
    /// ranges span a handful of seconds, so the bias is far below sampling
    /// noise.
    pub fn uniform_range(&mut self, lo: u32, hi: u32) -> u32 {
        if hi <= lo {
            return lo;
        }
        let span = u64::from(hi - lo) + 1;
        lo + (self.next_u64() % span) as u32
    }

    /// Pick an index with probability proportional to `weights[i]`.
    ///
    /// Returns `None` if the weights are empty or sum to zero.
    pub fn weighted_index(&mut self, weights: &[u32]) -> Option<usize> {
        let total: u64 = weights.iter().map(|&w| u64::from(w)).sum();
        if total == 0 {
            return None;
        }
        let mut pick = self.next_u64() % total;
        for (i, &w) in weights.iter().enumerate() {
            let w = u64::from(w);
            if pick < w {
                return Some(i);
            }
            pick -= w;
        }
        None
    }

    /// Get the internal state (for snapshots).
    pub fn state(&self) -> u64 {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_sequence() {
        let mut a = SimRng::new(10);
        let mut b = SimRng::new(10);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn uniform_range_stays_in_bounds() {
        let mut rng = SimRng::new(42);
        for _ in 0..1000 {
            let v = rng.uniform_range(9, 13);
            assert!((9..=13).contains(&v));
        }
    }

    #[test]
    fn uniform_range_degenerate() {
        let mut rng = SimRng::new(1);
        assert_eq!(rng.uniform_range(5, 5), 5);
        assert_eq!(rng.uniform_range(7, 3), 7);
    }

    #[test]
    fn weighted_index_respects_zero_weights() {
        let mut rng = SimRng::new(3);
        for _ in 0..200 {
            let i = rng.weighted_index(&[0, 10, 0]).unwrap();
            assert_eq!(i, 1);
        }
        assert_eq!(rng.weighted_index(&[0, 0]), None);
        assert_eq!(rng.weighted_index(&[]), None);
    }

    #[test]
    fn weighted_index_covers_all_positive_weights() {
        let mut rng = SimRng::new(7);
        let mut seen = [false; 3];
        for _ in 0..1000 {
            seen[rng.weighted_index(&[1, 1, 1]).unwrap()] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }
}
