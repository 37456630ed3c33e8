//! Seeded value generator - the sensor's only source of "chaos".
//!
//! Values are drawn from ChaCha8 so the sequence for a given seed is fixed by
//! the algorithm itself, not by the platform or the `rand` default RNG.

use rand::distributions::{Distribution, Uniform};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Smallest value a reading can carry.
pub const VALUE_MIN: u8 = 0;

/// Largest value a reading can carry.
pub const VALUE_MAX: u8 = 100;

/// Seed used by the testbed sensor.
pub const DEFAULT_SEED: u64 = 42;

/// A pseudo-random generator seeded exactly once.
///
/// There is no reseed operation; build a new generator instead.
#[derive(Debug, Clone)]
pub struct SeededGenerator {
    seed: u64,
    rng: ChaCha8Rng,
    range: Uniform<u8>,
    draws: u64,
}

impl SeededGenerator {
    /// Creates a generator seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            range: Uniform::new_inclusive(VALUE_MIN, VALUE_MAX),
            draws: 0,
        }
    }
    
    /// Draws the next value, uniform over `VALUE_MIN..=VALUE_MAX`.
    pub fn next_value(&mut self) -> u8 {
        self.draws += 1;
        self.range.sample(&mut self.rng)
    }
    
    /// Returns the seed this generator was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }
    
    /// Returns how many values have been drawn so far.
    pub fn draws(&self) -> u64 {
        self.draws
    }
}

impl Default for SeededGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}
