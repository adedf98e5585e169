use agora_core::RandomSource;
use serde::{Deserialize, Serialize};

/// Seeded PCG-style generator shared by the forum model, the executor and
/// the allocator's exploration noise.
///
/// The same seed yields the same simulation on every platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            state: seed ^ 0x9E37_79B9_7F4A_7C15,
        }
    }

    /// Independent stream for a sub-component, keyed by `salt`.
    #[must_use]
    pub const fn fork(seed: u64, salt: u64) -> Self {
        Self::new(seed.wrapping_mul(0x2545_F491_4F6C_DD1D).wrapping_add(salt))
    }

    pub const fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        // xorshift the output so low bits are usable for modulo.
        let x = self.state;
        (x ^ (x >> 29)).wrapping_mul(0xBF58_476D_1CE4_E5B9) ^ (x >> 32)
    }

    /// Value in `[0, upper_exclusive)`, or 0 when the bound is 0.
    pub const fn next_bounded(&mut self, upper_exclusive: u64) -> u64 {
        if upper_exclusive == 0 {
            return 0;
        }
        self.next_u64() % upper_exclusive
    }

    /// Index into a collection of `len` items, or `None` when empty.
    pub fn pick(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let bound = u64::try_from(len).unwrap_or(u64::MAX);
        usize::try_from(self.next_bounded(bound)).ok()
    }

    /// Bernoulli trial with integer percent.
    pub const fn hit_rate_percent(&mut self, percent: u8) -> bool {
        if percent == 0 {
            return false;
        }
        if percent >= 100 {
            return true;
        }
        self.next_bounded(100) < percent as u64
    }
}

impl RandomSource for DeterministicRng {
    #[allow(clippy::cast_precision_loss)]
    fn next_unit(&mut self) -> f64 {
        // Top 53 bits map exactly onto the f64 mantissa.
        (self.next_u64() >> 11) as f64 / (1_u64 << 53) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = DeterministicRng::new(7);
        let mut b = DeterministicRng::new(7);
        for _ in 0..32 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn forks_diverge() {
        let mut a = DeterministicRng::fork(7, 1);
        let mut b = DeterministicRng::fork(7, 2);
        let xs: Vec<u64> = (0..8).map(|_| a.next_u64()).collect();
        let ys: Vec<u64> = (0..8).map(|_| b.next_u64()).collect();
        assert_ne!(xs, ys);
    }

    #[test]
    fn unit_samples_stay_in_range() {
        let mut rng = DeterministicRng::new(99);
        for _ in 0..1_000 {
            let x = rng.next_unit();
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn pick_and_percent_edges() {
        let mut rng = DeterministicRng::new(3);
        assert_eq!(rng.pick(0), None);
        assert_eq!(rng.pick(1), Some(0));
        assert!(!rng.hit_rate_percent(0));
        assert!(rng.hit_rate_percent(100));
    }
}
