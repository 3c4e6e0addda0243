//! Label row encoding for the three output-layer training strategies.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::classes::ClassMap;
use crate::config::ReaderMode;
use crate::error::{ReaderError, Result};
use crate::noise::NoiseSampler;

/// Encodes one target word id into the label row the downstream loss expects.
///
/// Row layout per mode:
/// - Softmax: `[id]`
/// - Class:   `[id, class, class_begin, class_end]`
/// - Nce(k):  `[id, logprob(id), neg_1, -logprob(neg_1), ..., neg_k, -logprob(neg_k)]`
///
/// The only side effect is the noise sampler's random-state advance.
#[derive(Debug)]
pub struct LabelEncoder {
    mode: ReaderMode,
    classes: Option<ClassMap>,
    sampler: Option<NoiseSampler>,
    rng: StdRng,
}

impl LabelEncoder {
    /// Check mode/table consistency once at configuration time
    pub fn new(
        mode: ReaderMode,
        classes: Option<ClassMap>,
        sampler: Option<NoiseSampler>,
        seed: Option<u64>,
    ) -> Result<Self> {
        if matches!(mode, ReaderMode::Class) && classes.is_none() {
            return Err(ReaderError::Config(
                "class mode requires a word class file".into(),
            ));
        }
        if matches!(mode, ReaderMode::Nce { .. }) && sampler.is_none() {
            return Err(ReaderError::Config(
                "nce mode requires unigram counts for the noise sampler".into(),
            ));
        }
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            mode,
            classes,
            sampler,
            rng,
        })
    }

    /// Active mode
    pub fn mode(&self) -> ReaderMode {
        self.mode
    }

    /// Rows one encoded label occupies
    pub fn row_dim(&self) -> usize {
        self.mode.label_dim()
    }

    /// Encode `id` into `out`, which must hold exactly `row_dim()` values
    pub fn encode_into(&mut self, id: u32, out: &mut [f32]) -> Result<()> {
        debug_assert_eq!(out.len(), self.row_dim());
        out[0] = id as f32;

        match self.mode {
            ReaderMode::Softmax => {}
            ReaderMode::Class => {
                let classes = self.classes.as_ref().ok_or_else(|| {
                    ReaderError::Logic("class mode encoder without class table".into())
                })?;
                let class = classes.class_of(id).ok_or_else(|| {
                    ReaderError::Logic(format!("word id {id} outside the class table"))
                })?;
                let range = classes.range_of(class).ok_or_else(|| {
                    ReaderError::Logic(format!("class {class} has no id range"))
                })?;
                if id < range.begin || id >= range.end {
                    return Err(ReaderError::Logic(format!(
                        "word id {id} lies outside its class {class} range [{}, {})",
                        range.begin, range.end
                    )));
                }
                out[1] = class as f32;
                out[2] = range.begin as f32;
                out[3] = range.end as f32;
            }
            ReaderMode::Nce { samples } => {
                let sampler = self.sampler.as_ref().ok_or_else(|| {
                    ReaderError::Logic("nce mode encoder without noise sampler".into())
                })?;
                out[1] = sampler.log_prob(id) as f32;
                for noise in 0..samples {
                    let neg = sampler.sample(&mut self.rng);
                    out[2 * (noise + 1)] = neg as f32;
                    out[2 * (noise + 1) + 1] = -sampler.log_prob(neg) as f32;
                }
            }
        }
        Ok(())
    }

    /// Convenience allocation of one encoded row
    pub fn encode(&mut self, id: u32) -> Result<Vec<f32>> {
        let mut row = vec![0f32; self.row_dim()];
        self.encode_into(id, &mut row)?;
        Ok(row)
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_row_dim_matches_mode(samples in 0usize..16, id in 0u32..100) {
            let counts = vec![1.0f64; 100];
            let sampler = NoiseSampler::new(&counts).unwrap();
            let mut encoder = LabelEncoder::new(
                ReaderMode::Nce { samples },
                None,
                Some(sampler),
                Some(0),
            )
            .unwrap();
            let row = encoder.encode(id).unwrap();
            prop_assert_eq!(row.len(), 2 * (samples + 1));
            prop_assert_eq!(row[0], id as f32);
        }
    }
}
