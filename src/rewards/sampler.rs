//! Weighted random sampling without replacement.
//!
//! Epistemic foundation:
//! - K_i: Weights are exact fixed-point integers; the running total is a `u128`
//!   so no floating-point drift accumulates across draws
//! - K_i: Each step picks uniformly in `[0, remaining_total)` and walks the
//!   cumulative sum, giving probability `weight / remaining_total`
//! - B_i: Caller-supplied weights may be zero → Result

use crate::models::{SamplingError, Vests};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

/// A participant eligible to be drawn, weighted by stake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedParticipant {
    pub id: String,
    pub weight: Vests,
}

impl WeightedParticipant {
    pub fn new(id: impl Into<String>, weight: Vests) -> Self {
        Self {
            id: id.into(),
            weight,
        }
    }
}

/// Draws weighted random permutations from an injected random source.
///
/// Given the same seed and input, every draw is reproducible.
pub struct WeightedSampler<R: Rng> {
    rng: R,
}

impl WeightedSampler<ChaCha20Rng> {
    /// Deterministic sampler for tests and replays.
    pub fn seeded(seed: u64) -> Self {
        Self::new(ChaCha20Rng::seed_from_u64(seed))
    }

    /// Sampler seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self::new(ChaCha20Rng::from_entropy())
    }
}

impl<R: Rng> WeightedSampler<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Full weighted permutation of `participants`.
    pub fn draw_order(
        &mut self,
        participants: &[WeightedParticipant],
    ) -> Result<Vec<String>, SamplingError> {
        self.draw_k(participants, participants.len())
    }

    /// First `k` ids of the weighted permutation. `k` larger than the input
    /// yields the whole permutation.
    pub fn draw_k(
        &mut self,
        participants: &[WeightedParticipant],
        k: usize,
    ) -> Result<Vec<String>, SamplingError> {
        let mut pool = Pool::new(participants)?;
        let take = k.min(participants.len());
        let mut order = Vec::with_capacity(take);

        while order.len() < take {
            order.push(pool.take(&mut self.rng)?);
        }

        Ok(order)
    }

    /// Draw a single id. Fails on an empty pool.
    pub fn draw(&mut self, participants: &[WeightedParticipant]) -> Result<String, SamplingError> {
        Pool::new(participants)?.take(&mut self.rng)
    }
}

/// Remaining participants and their exact weight total.
struct Pool {
    entries: Vec<(String, u128)>,
    total: u128,
}

impl Pool {
    fn new(participants: &[WeightedParticipant]) -> Result<Self, SamplingError> {
        let mut entries = Vec::with_capacity(participants.len());
        let mut total: u128 = 0;

        for p in participants {
            if p.weight.is_zero() {
                return Err(SamplingError::NonPositiveWeight(p.id.clone()));
            }
            total = total.saturating_add(p.weight.micros());
            entries.push((p.id.clone(), p.weight.micros()));
        }

        Ok(Self { entries, total })
    }

    fn take<R: Rng>(&mut self, rng: &mut R) -> Result<String, SamplingError> {
        if self.entries.is_empty() || self.total == 0 {
            return Err(SamplingError::EmptyPool);
        }

        let target = rng.gen_range(0..self.total);
        let mut cumulative: u128 = 0;
        let mut index = self.entries.len() - 1;
        for (i, (_, weight)) in self.entries.iter().enumerate() {
            cumulative += weight;
            if target < cumulative {
                index = i;
                break;
            }
        }

        let (id, weight) = self.entries.remove(index);
        self.total -= weight;
        Ok(id)
    }
}
