//! xorshift64* random number generator
//!
//! Fast, deterministic PRNG used for every random draw in the simulator.
//! Determinism is a hard contract: the same seed, agent set, and inputs must
//! reproduce a byte-identical event trace, so no draw may come from anywhere
//! but a seeded [`RngManager`] stream.
//!
//! Each component owns its own stream ([`RngManager::split`]): the kernel
//! draws latency noise, the oracle draws fundamental shocks and observation
//! noise, and every trading agent draws its own strategy randomness.
//! Keeping streams separate means one component consuming more or fewer
//! draws cannot perturb another component's sequence.

use serde::{Deserialize, Serialize};

/// Deterministic random number generator using xorshift64*.
///
/// # Example
/// ```
/// use market_simulator_core_rs::RngManager;
///
/// let mut rng = RngManager::new(12345);
/// let value = rng.next();
/// let cents = rng.range(0, 100); // [0, 100)
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngManager {
    /// Internal state (64-bit, never zero)
    state: u64,
}

impl RngManager {
    /// Create a new RNG with the given seed.
    ///
    /// A zero seed is mapped to 1 (xorshift state must be non-zero).
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Derive an independent stream from this one.
    ///
    /// Advances this generator by one draw and seeds the child with it, so
    /// components split in a fixed order always receive the same seeds.
    pub fn split(&mut self) -> RngManager {
        RngManager::new(self.next())
    }

    /// Generate the next random u64 value.
    pub fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Generate a random value in `[min, max)`.
    ///
    /// # Panics
    /// Panics if `min >= max`.
    pub fn range(&mut self, min: i64, max: i64) -> i64 {
        assert!(min < max, "min must be less than max");

        let value = self.next();
        let range_size = (max - min) as u64;
        min + (value % range_size) as i64
    }

    /// Generate a random f64 in `[0.0, 1.0)`.
    pub fn next_f64(&mut self) -> f64 {
        let value = self.next();
        (value >> 11) as f64 * (1.0 / ((1u64 << 53) as f64))
    }

    /// Draw from a normal distribution via Box-Muller.
    ///
    /// Consumes exactly two uniform draws per call (no cached spare), so the
    /// stream position is a simple function of the call count.
    pub fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        assert!(std_dev >= 0.0, "std_dev must be non-negative");

        // 1 - u keeps the argument of ln() away from zero.
        let u1 = 1.0 - self.next_f64();
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }

    /// Draw from an exponential distribution with the given mean.
    pub fn exponential(&mut self, mean: f64) -> f64 {
        assert!(mean > 0.0, "mean must be positive");

        let u = 1.0 - self.next_f64();
        -mean * u.ln()
    }

    /// Sample an index from a discrete probability distribution.
    ///
    /// `probs[i]` is the probability of returning `i`; the entries must be
    /// non-negative and sum to (approximately) one. Sampled by cumulative
    /// scan, so a degenerate `[1.0]` always returns 0.
    pub fn pick_weighted(&mut self, probs: &[f64]) -> usize {
        assert!(!probs.is_empty(), "probs must be non-empty");

        let u = self.next_f64();
        let mut acc = 0.0;
        for (i, p) in probs.iter().enumerate() {
            acc += p;
            if u < acc {
                return i;
            }
        }
        // Floating point residue: settle on the last entry.
        probs.len() - 1
    }

    /// Get the current RNG state (for checkpointing or replay).
    pub fn get_state(&self) -> u64 {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_seed_converted_to_nonzero() {
        let rng = RngManager::new(0);
        assert_ne!(rng.get_state(), 0, "Zero seed should be converted to 1");
    }

    #[test]
    #[should_panic(expected = "min must be less than max")]
    fn test_range_invalid_bounds() {
        let mut rng = RngManager::new(12345);
        rng.range(100, 50);
    }

    #[test]
    fn test_next_f64_in_range() {
        let mut rng = RngManager::new(12345);

        for _ in 0..1000 {
            let val = rng.next_f64();
            assert!(
                (0.0..1.0).contains(&val),
                "next_f64() produced value {} outside [0.0, 1.0)",
                val
            );
        }
    }

    #[test]
    fn test_streams_deterministic() {
        let mut rng1 = RngManager::new(99999);
        let mut rng2 = RngManager::new(99999);

        for _ in 0..100 {
            assert_eq!(rng1.next(), rng2.next());
        }
    }

    #[test]
    fn test_split_streams_are_independent_and_reproducible() {
        let mut master1 = RngManager::new(7);
        let mut master2 = RngManager::new(7);

        let mut a1 = master1.split();
        let mut b1 = master1.split();
        let mut a2 = master2.split();
        let mut b2 = master2.split();

        // Same split order, same child sequences.
        for _ in 0..50 {
            assert_eq!(a1.next(), a2.next());
            assert_eq!(b1.next(), b2.next());
        }

        // Distinct children start from distinct states.
        assert_ne!(a1.get_state(), b1.get_state());
    }

    #[test]
    fn test_normal_moments() {
        let mut rng = RngManager::new(2024);
        let n = 20_000;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        for _ in 0..n {
            let x = rng.normal(10.0, 2.0);
            sum += x;
            sum_sq += x * x;
        }
        let mean = sum / n as f64;
        let var = sum_sq / n as f64 - mean * mean;
        assert!((mean - 10.0).abs() < 0.1, "sample mean {} far from 10", mean);
        assert!((var - 4.0).abs() < 0.3, "sample variance {} far from 4", var);
    }

    #[test]
    fn test_exponential_positive_with_correct_mean() {
        let mut rng = RngManager::new(31337);
        let n = 20_000;
        let mut sum = 0.0;
        for _ in 0..n {
            let x = rng.exponential(200.0);
            assert!(x >= 0.0);
            sum += x;
        }
        let mean = sum / n as f64;
        assert!((mean - 200.0).abs() < 10.0, "sample mean {} far from 200", mean);
    }

    #[test]
    fn test_pick_weighted_degenerate() {
        let mut rng = RngManager::new(1);
        for _ in 0..100 {
            assert_eq!(rng.pick_weighted(&[1.0]), 0);
        }
    }

    #[test]
    fn test_pick_weighted_respects_weights() {
        let mut rng = RngManager::new(42);
        let probs = [0.0, 0.25, 0.75];
        let mut counts = [0usize; 3];
        for _ in 0..10_000 {
            counts[rng.pick_weighted(&probs)] += 1;
        }
        assert_eq!(counts[0], 0);
        assert!(counts[1] > 2_000 && counts[1] < 3_000, "counts: {:?}", counts);
        assert!(counts[2] > 7_000, "counts: {:?}", counts);
    }
}
