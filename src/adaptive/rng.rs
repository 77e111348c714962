use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Source of uniform draws in `[0, 1)`.
///
/// One instance is created per session from the policy seed and handed to every
/// component that explores or breaks ties, so a session replays identically.
pub trait RandomSource: Send {
    fn next_unit(&mut self) -> f64;

    /// Uniform index in `0..len`; returns 0 for an empty range.
    fn next_index(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        let idx = (self.next_unit() * len as f64).floor() as usize;
        idx.min(len - 1)
    }
}

pub struct SeededRandom {
    rng: ChaCha8Rng,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_unit(&mut self) -> f64 {
        self.rng.random::<f64>()
    }
}

/// Replays a fixed sequence, wrapping around. Test double.
pub struct ScriptedRandom {
    values: Vec<f64>,
    pos: usize,
}

impl ScriptedRandom {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values, pos: 0 }
    }
}

impl RandomSource for ScriptedRandom {
    fn next_unit(&mut self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let v = self.values[self.pos % self.values.len()];
        self.pos += 1;
        v.clamp(0.0, 1.0 - f64::EPSILON)
    }
}

/// FNV-1a over the string, so textual seeds (e.g. a session code) map to a stable u64.
pub fn hash_seed(seed: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    seed.bytes()
        .fold(OFFSET, |h, b| (h ^ u64::from(b)).wrapping_mul(PRIME))
}

/// Numeric seeds are used as-is; anything else is hashed.
pub fn parse_seed(seed: &str) -> u64 {
    seed.trim()
        .parse::<u64>()
        .unwrap_or_else(|_| hash_seed(seed.trim()))
}
