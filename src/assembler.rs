//! Cohort state machine: groups equal-length sequences into parallel streams.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{ReaderError, Result};
use crate::source::{ParsedChunk, SequenceSource};

/// Groups equal-length sequences from parsed chunks into a cohort of parallel
/// streams and advances them in lockstep.
///
/// States: Empty -> CohortActive -> CohortExhausted -> Empty, or EndOfSource
/// once the source produces an empty chunk. All cohort members share one
/// `pos_in_sentence` cursor; lengths are strictly equal at formation time.
#[derive(Debug)]
pub struct SequenceAssembler {
    num_streams: usize,
    mb_size: usize,
    max_chunk_sequences: usize,
    end_marker: String,
    rng: StdRng,
    chunk: ParsedChunk,
    processed: Vec<bool>,
    cohort: Vec<usize>,
    pos_in_sentence: usize,
    end_of_source: bool,
}

impl SequenceAssembler {
    pub fn new(
        num_streams: usize,
        mb_size: usize,
        max_chunk_sequences: usize,
        end_marker: impl Into<String>,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        };
        Self {
            num_streams,
            mb_size,
            max_chunk_sequences,
            end_marker: end_marker.into(),
            rng,
            chunk: ParsedChunk::default(),
            processed: Vec::new(),
            cohort: Vec::new(),
            pos_in_sentence: 0,
            end_of_source: false,
        }
    }

    /// Return to the Empty state for a new epoch
    pub fn reset(&mut self) {
        self.chunk = ParsedChunk::default();
        self.processed.clear();
        self.cohort.clear();
        self.pos_in_sentence = 0;
        self.end_of_source = false;
    }

    /// True once the source has been fully consumed
    pub fn end_of_source(&self) -> bool {
        self.end_of_source
    }

    /// Number of sequences currently occupying the parallel streams
    pub fn active_streams(&self) -> usize {
        self.cohort.len()
    }

    /// Shared cursor of the active cohort
    pub fn pos_in_sentence(&self) -> usize {
        self.pos_in_sentence
    }

    /// Original length of the active cohort's sequences
    pub fn cohort_len(&self) -> usize {
        self.cohort
            .first()
            .map_or(0, |&s| self.chunk.sequences[s].len)
    }

    /// Timesteps the next call may offer; the last token is excluded since it
    /// has no next-word target.
    pub fn steps_available(&self) -> usize {
        let len = self.cohort_len();
        if len == 0 {
            return 0;
        }
        self.mb_size.min(len - 1 - self.pos_in_sentence)
    }

    /// Token of cohort member `stream` at `offset` into the sequence
    pub fn token_at(&self, stream: usize, offset: usize) -> &str {
        let info = self.chunk.sequences[self.cohort[stream]];
        debug_assert!(offset < info.len);
        &self.chunk.tokens[info.begin + offset]
    }

    /// Make a cohort active, pulling and shuffling a fresh chunk from the
    /// source when the buffered one is spent. Returns false at end of source.
    pub fn ensure_cohort(&mut self, source: &mut dyn SequenceSource) -> Result<bool> {
        loop {
            if !self.cohort.is_empty() {
                return Ok(true);
            }
            if self.end_of_source {
                return Ok(false);
            }
            if self.form_cohort()? {
                return Ok(true);
            }

            let chunk = source.parse(self.max_chunk_sequences)?;
            if chunk.sequences.is_empty() {
                self.end_of_source = true;
                return Ok(false);
            }
            self.validate_chunk(&chunk)?;
            self.processed = vec![false; chunk.sequences.len()];
            self.chunk = chunk;
            // randomize which sequences co-occur in a cohort across epochs
            self.chunk.sequences.shuffle(&mut self.rng);
        }
    }

    /// Advance every cohort member by `steps` timesteps; at the last target
    /// position the members are marked processed and the cohort cleared.
    pub fn advance(&mut self, steps: usize) {
        let len = self.cohort_len();
        if len == 0 {
            return;
        }
        self.pos_in_sentence += steps;
        if self.pos_in_sentence >= len - 1 {
            for &seq in &self.cohort {
                self.processed[seq] = true;
            }
            self.cohort.clear();
            self.pos_in_sentence = 0;
        }
    }

    /// Collect unprocessed sequences of exactly the first unprocessed
    /// sequence's length, up to `num_streams` of them.
    fn form_cohort(&mut self) -> Result<bool> {
        let mut target_len = 0usize;
        for (idx, info) in self.chunk.sequences.iter().enumerate() {
            if self.processed[idx] {
                continue;
            }
            if target_len == 0 {
                target_len = info.len;
                if target_len > self.mb_size {
                    return Err(ReaderError::DataFormat(format!(
                        "sequence length {target_len} exceeds the configured minibatch size {}; increase mb_size",
                        self.mb_size
                    )));
                }
            }
            if info.len == target_len {
                self.cohort.push(idx);
                if self.cohort.len() == self.num_streams {
                    break;
                }
            }
        }

        if self.cohort.is_empty() {
            return Ok(false);
        }
        if self.cohort.len() < self.num_streams {
            eprintln!(
                "Warning: only {} of {} parallel streams filled, too few length-{target_len} sequences in this chunk",
                self.cohort.len(),
                self.num_streams
            );
        }
        self.pos_in_sentence = 0;
        Ok(true)
    }

    fn validate_chunk(&self, chunk: &ParsedChunk) -> Result<()> {
        for info in &chunk.sequences {
            if info.len < 2 {
                return Err(ReaderError::DataFormat(
                    "a sequence must contain at least two tokens including its end marker".into(),
                ));
            }
            if !self.end_marker.is_empty() {
                let last = &chunk.tokens[info.begin + info.len - 1];
                if !last.eq_ignore_ascii_case(&self.end_marker) {
                    return Err(ReaderError::DataFormat(format!(
                        "the last token of a sequence must be the end-of-sequence marker '{}', found '{last}'",
                        self.end_marker
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySource;

    fn seq(words: &[&str]) -> Vec<String> {
        let mut tokens = vec!["<s>".to_string()];
        tokens.extend(words.iter().map(|w| w.to_string()));
        tokens.push("</s>".to_string());
        tokens
    }

    fn assembler(streams: usize, mb: usize) -> SequenceAssembler {
        SequenceAssembler::new(streams, mb, 1000, "</s>", Some(11))
    }

    #[test]
    fn test_empty_source_is_end_of_source() {
        let mut source = InMemorySource::new(Vec::<Vec<String>>::new());
        let mut asm = assembler(1, 10);
        assert!(!asm.ensure_cohort(&mut source).unwrap());
        assert!(asm.end_of_source());
    }

    #[test]
    fn test_single_sequence_cohort() {
        let mut source = InMemorySource::new([seq(&["the", "cat"])]);
        let mut asm = assembler(1, 10);
        assert!(asm.ensure_cohort(&mut source).unwrap());
        assert_eq!(asm.active_streams(), 1);
        assert_eq!(asm.cohort_len(), 4);
        assert_eq!(asm.steps_available(), 3);
        assert_eq!(asm.token_at(0, 0), "<s>");
        assert_eq!(asm.token_at(0, 3), "</s>");

        asm.advance(3);
        assert_eq!(asm.active_streams(), 0);
        assert!(!asm.ensure_cohort(&mut source).unwrap());
    }

    #[test]
    fn test_equal_lengths_grouped_different_deferred() {
        let mut source = InMemorySource::new([
            seq(&["a"]),
            seq(&["b"]),
            seq(&["c", "d"]),
        ]);
        let mut asm = assembler(2, 10);

        let mut cohort_sizes = Vec::new();
        let mut lens = Vec::new();
        while asm.ensure_cohort(&mut source).unwrap() {
            cohort_sizes.push(asm.active_streams());
            lens.push(asm.cohort_len());
            let steps = asm.steps_available();
            asm.advance(steps);
        }

        cohort_sizes.sort_unstable();
        assert_eq!(cohort_sizes, vec![1, 2]);
        // the pair of length-3 sequences forms one cohort, the length-4 one
        // runs alone
        assert!(lens.contains(&3) && lens.contains(&4));
    }

    #[test]
    fn test_every_sequence_processed_once() {
        let sequences: Vec<Vec<String>> = (0..17)
            .map(|i| seq(&vec!["w"; 1 + (i % 4)]))
            .collect();
        let expected_samples: usize = sequences.iter().map(|s| s.len() - 1).sum();

        let mut source = InMemorySource::new(sequences);
        let mut asm = assembler(3, 16);

        let mut emitted = 0usize;
        while asm.ensure_cohort(&mut source).unwrap() {
            let steps = asm.steps_available();
            assert!(steps > 0);
            assert!(asm.active_streams() >= 1 && asm.active_streams() <= 3);
            emitted += steps * asm.active_streams();
            asm.advance(steps);
        }
        assert_eq!(emitted, expected_samples);
    }

    #[test]
    fn test_sequence_longer_than_mb_size_rejected() {
        let mut source = InMemorySource::new([seq(&["a", "b", "c", "d", "e"])]);
        let mut asm = assembler(1, 4);
        let err = asm.ensure_cohort(&mut source).unwrap_err();
        assert!(matches!(err, ReaderError::DataFormat(_)));
        assert!(err.to_string().contains("minibatch size"));
    }

    #[test]
    fn test_missing_end_marker_rejected() {
        let mut source = InMemorySource::new([vec!["<s>", "the", "cat"]]);
        let mut asm = assembler(1, 10);
        let err = asm.ensure_cohort(&mut source).unwrap_err();
        assert!(matches!(err, ReaderError::DataFormat(_)));
        assert!(err.to_string().contains("end-of-sequence marker"));
    }

    #[test]
    fn test_reset_returns_to_empty() {
        let mut source = InMemorySource::new([seq(&["a"])]);
        let mut asm = assembler(1, 10);
        assert!(asm.ensure_cohort(&mut source).unwrap());
        asm.reset();
        assert_eq!(asm.active_streams(), 0);
        assert!(!asm.end_of_source());

        source.rewind().unwrap();
        assert!(asm.ensure_cohort(&mut source).unwrap());
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::source::InMemorySource;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Cohorts always hold equal original lengths, never exceed the
        /// requested stream count, and consume every sequence exactly once.
        #[test]
        fn prop_cohorts_equal_length_exactly_once(
            lens in proptest::collection::vec(2usize..9, 1..40),
            streams in 1usize..5,
            seed in any::<u64>(),
        ) {
            let sequences: Vec<Vec<String>> = lens
                .iter()
                .map(|&len| {
                    let mut tokens = vec!["w".to_string(); len - 1];
                    tokens.push("</s>".to_string());
                    tokens
                })
                .collect();
            let expected: usize = lens.iter().map(|l| l - 1).sum();

            let mut source = InMemorySource::new(sequences);
            let mut asm = SequenceAssembler::new(streams, 8, 1000, "</s>", Some(seed));

            let mut emitted = 0usize;
            while asm.ensure_cohort(&mut source).unwrap() {
                prop_assert!(asm.active_streams() >= 1);
                prop_assert!(asm.active_streams() <= streams);
                let len = asm.cohort_len();
                for s in 0..asm.active_streams() {
                    // strict length equality inside a cohort
                    prop_assert_eq!(asm.token_at(s, len - 1), "</s>");
                }
                let steps = asm.steps_available();
                prop_assert!(steps >= 1);
                emitted += steps * asm.active_streams();
                asm.advance(steps);
            }
            prop_assert_eq!(emitted, expected);
        }
    }
}
