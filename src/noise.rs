//! Unigram-frequency noise sampler for NCE training.

use rand::Rng;

use crate::error::{ReaderError, Result};

/// Draws word ids proportional to their unigram counts and reports their
/// log-probabilities under the normalized count distribution.
///
/// The cumulative table is built once and never mutated; sampling is a
/// binary search, `O(log V)` per draw.
#[derive(Debug, Clone)]
pub struct NoiseSampler {
    cumulative: Vec<f64>,
    log_probs: Vec<f64>,
    total: f64,
}

impl NoiseSampler {
    /// Build from per-id unigram counts
    pub fn new(counts: &[f64]) -> Result<Self> {
        if counts.is_empty() {
            return Err(ReaderError::Config(
                "noise sampler requires a non-empty count table".into(),
            ));
        }
        if counts.iter().any(|&c| c < 0.0 || !c.is_finite()) {
            return Err(ReaderError::Config(
                "noise sampler counts must be finite and non-negative".into(),
            ));
        }

        let total: f64 = counts.iter().sum();
        if total <= 0.0 {
            return Err(ReaderError::Config(
                "noise sampler counts must not sum to zero".into(),
            ));
        }

        let mut cumulative = Vec::with_capacity(counts.len());
        let mut running = 0.0;
        for &count in counts {
            running += count;
            cumulative.push(running);
        }

        let log_probs = counts.iter().map(|&c| (c / total).ln()).collect();

        Ok(Self {
            cumulative,
            log_probs,
            total,
        })
    }

    /// Vocabulary size of the distribution
    pub fn len(&self) -> usize {
        self.cumulative.len()
    }

    /// True if the table is empty (never constructed that way)
    pub fn is_empty(&self) -> bool {
        self.cumulative.is_empty()
    }

    /// Draw one word id proportional to its count
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        let point = rng.random::<f64>() * self.total;
        let idx = self.cumulative.partition_point(|&c| c <= point);
        idx.min(self.cumulative.len() - 1) as u32
    }

    /// Probability of the given id under the normalized count distribution
    pub fn prob(&self, id: u32) -> f64 {
        self.log_probs
            .get(id as usize)
            .map_or(0.0, |lp| lp.exp())
    }

    /// Log-probability of the given id
    pub fn log_prob(&self, id: u32) -> f64 {
        self.log_probs.get(id as usize).copied().unwrap_or(f64::NEG_INFINITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_rejects_empty_counts() {
        assert!(NoiseSampler::new(&[]).is_err());
    }

    #[test]
    fn test_rejects_zero_total() {
        assert!(NoiseSampler::new(&[0.0, 0.0]).is_err());
    }

    #[test]
    fn test_rejects_negative_counts() {
        assert!(NoiseSampler::new(&[1.0, -2.0]).is_err());
    }

    #[test]
    fn test_probs_normalize_to_one() {
        let sampler = NoiseSampler::new(&[4.0, 4.0, 3.0, 1.0]).unwrap();
        let sum: f64 = (0..4).map(|id| sampler.log_prob(id).exp()).sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_log_prob_matches_counts() {
        let sampler = NoiseSampler::new(&[1.0, 3.0]).unwrap();
        assert_relative_eq!(sampler.log_prob(0), (0.25f64).ln(), epsilon = 1e-12);
        assert_relative_eq!(sampler.log_prob(1), (0.75f64).ln(), epsilon = 1e-12);
        assert_relative_eq!(sampler.prob(1), 0.75, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_count_id_never_sampled() {
        let sampler = NoiseSampler::new(&[1.0, 0.0, 1.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10_000 {
            assert_ne!(sampler.sample(&mut rng), 1);
        }
        assert_eq!(sampler.log_prob(1), f64::NEG_INFINITY);
    }

    #[test]
    fn test_empirical_marginal_matches_counts() {
        let counts = [10.0, 40.0, 25.0, 25.0];
        let sampler = NoiseSampler::new(&counts).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let draws = 200_000usize;
        let mut observed = [0usize; 4];
        for _ in 0..draws {
            observed[sampler.sample(&mut rng) as usize] += 1;
        }

        let total: f64 = counts.iter().sum();
        for (id, &count) in counts.iter().enumerate() {
            let expected = count / total;
            let actual = observed[id] as f64 / draws as f64;
            assert!(
                (actual - expected).abs() < 0.01,
                "id {id}: expected {expected:.3}, observed {actual:.3}"
            );
        }
    }
}
