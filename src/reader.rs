//! Minibatch orchestration: drives the assembler, encodes labels, fills sinks.

use std::path::PathBuf;

use crate::assembler::SequenceAssembler;
use crate::classes::ClassMap;
use crate::config::{EpochSize, ReaderConfig};
use crate::encoder::LabelEncoder;
use crate::error::{ReaderError, Result};
use crate::noise::NoiseSampler;
use crate::source::{SequenceSource, TextSequenceSource};
use crate::vocab::VocabularyIndex;

/// Opaque row/column-addressed consumer of minibatch data.
///
/// Downstream tensor storage implements this; the builder never sees device
/// memory.
pub trait MatrixSink {
    /// Shape the sink for the coming minibatch
    fn resize(&mut self, rows: usize, cols: usize);
    /// Write one value
    fn set(&mut self, row: usize, col: usize, value: f32);
}

/// Plain `Vec<f32>`-backed sink, row-major
#[derive(Debug, Clone, Default)]
pub struct DenseSink {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl DenseSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    /// One row as a slice
    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }
}

impl MatrixSink for DenseSink {
    fn resize(&mut self, rows: usize, cols: usize) {
        self.rows = rows;
        self.cols = cols;
        self.data.clear();
        self.data.resize(rows * cols, 0.0);
    }

    fn set(&mut self, row: usize, col: usize, value: f32) {
        self.data[row * self.cols + col] = value;
    }
}

/// Sequence boundary flags of one (stream, timestep) cell
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamFlags {
    /// First position of a sequence
    pub seq_start: bool,
    /// Emitted label is the end-of-sequence id at the call's last position
    pub seq_end: bool,
}

/// Per-stream begin/end flags of the just-produced minibatch, time-major
/// stream-minor like the data buffers.
#[derive(Debug, Clone, Default)]
pub struct MinibatchLayout {
    streams: usize,
    steps: usize,
    flags: Vec<StreamFlags>,
}

impl MinibatchLayout {
    /// Streams active in the last minibatch
    pub fn num_streams(&self) -> usize {
        self.streams
    }

    /// Timesteps offered in the last minibatch
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Flags of one (stream, timestep) cell
    pub fn flags_at(&self, stream: usize, step: usize) -> StreamFlags {
        self.flags[step * self.streams + stream]
    }

    fn reset(&mut self, streams: usize, steps: usize) {
        self.streams = streams;
        self.steps = steps;
        self.flags.clear();
        self.flags.resize(streams * steps, StreamFlags::default());
    }

    fn set(&mut self, stream: usize, step: usize, flags: StreamFlags) {
        self.flags[step * self.streams + stream] = flags;
    }
}

/// Constructs minibatches for one training stream.
///
/// Single-threaded and pull-based: the caller drives production with
/// repeated [`next_minibatch`](Self::next_minibatch) calls. Output buffers
/// are overwritten on the next call; consumers needing data longer must copy.
#[derive(Debug)]
pub struct MinibatchBuilder<S: SequenceSource> {
    config: ReaderConfig,
    source: S,
    vocab: VocabularyIndex,
    encoder: LabelEncoder,
    assembler: SequenceAssembler,
    layout: MinibatchLayout,
    row_scratch: Vec<f32>,
    end_id: u32,
    epoch: usize,
    requested: EpochSize,
    epoch_size: Option<u64>,
    samples_this_epoch: u64,
    first_pass_done: bool,
    pending_persist: Option<PathBuf>,
    epoch_boundary: bool,
    dataset_boundary: bool,
    sequence_boundary: bool,
    started: bool,
}

impl MinibatchBuilder<TextSequenceSource> {
    /// Open a builder over the configured corpus, loading the vocabulary and
    /// class tables.
    ///
    /// A missing vocabulary mapping file is recovered from the class file
    /// when one is configured; the auto-built mapping is persisted once at
    /// the end of the first pass. Without a fallback the missing file is
    /// fatal.
    pub fn open(config: ReaderConfig) -> Result<Self> {
        config.validate()?;

        let classes = match &config.class_file {
            Some(path) => Some(ClassMap::load(path, config.vocab_size)?),
            None => None,
        };
        let sampler = match &classes {
            Some(classes) => {
                if classes.id_of(&config.markers.unk).is_none() {
                    return Err(ReaderError::Config(format!(
                        "unk symbol '{}' is not in the class file vocabulary",
                        config.markers.unk
                    )));
                }
                Some(NoiseSampler::new(classes.counts())?)
            }
            None => None,
        };

        let mut pending_persist = None;
        let vocab = match &config.vocab_file {
            Some(path) if path.exists() => {
                VocabularyIndex::load(path, config.markers.unk.clone())?
            }
            Some(path) => match &classes {
                Some(classes) => {
                    pending_persist = Some(path.clone());
                    VocabularyIndex::from_class_map(classes, config.markers.unk.clone())?
                }
                None => {
                    return Err(ReaderError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!(
                            "label mapping file {} not found and no class file fallback is configured",
                            path.display()
                        ),
                    )))
                }
            },
            None => match &classes {
                Some(classes) => {
                    VocabularyIndex::from_class_map(classes, config.markers.unk.clone())?
                }
                None => {
                    return Err(ReaderError::Config(
                        "no vocabulary source configured: set vocab_file or class_file".into(),
                    ))
                }
            },
        };

        let train_file = config.train_file.clone().ok_or_else(|| {
            ReaderError::Config("train_file is required to open a corpus".into())
        })?;
        let source = TextSequenceSource::open(&train_file, config.markers.clone())?;

        let mut builder = Self::new(config, source, vocab, classes, sampler)?;
        builder.pending_persist = pending_persist;
        Ok(builder)
    }
}

impl<S: SequenceSource> MinibatchBuilder<S> {
    /// Assemble a builder from already-loaded tables and an arbitrary source
    pub fn new(
        config: ReaderConfig,
        source: S,
        vocab: VocabularyIndex,
        classes: Option<ClassMap>,
        sampler: Option<NoiseSampler>,
    ) -> Result<Self> {
        config.validate()?;

        if config.vocab_size > 0 && vocab.len() != config.vocab_size {
            return Err(ReaderError::Config(format!(
                "declared vocabulary size {} does not match the loaded mapping of {} tokens",
                config.vocab_size,
                vocab.len()
            )));
        }

        let end_id = vocab.id_of(&config.markers.end).ok_or_else(|| {
            ReaderError::Config(format!(
                "end-of-sequence marker '{}' is not in vocabulary",
                config.markers.end
            ))
        })?;

        let encoder = LabelEncoder::new(config.mode, classes, sampler, config.shuffle_seed)?;
        let assembler = SequenceAssembler::new(
            config.num_streams,
            config.mb_size,
            config.max_chunk_sequences,
            config.markers.end.clone(),
            config.shuffle_seed,
        );
        let row_scratch = vec![0f32; encoder.row_dim()];

        Ok(Self {
            config,
            source,
            vocab,
            encoder,
            assembler,
            layout: MinibatchLayout::default(),
            row_scratch,
            end_id,
            epoch: 0,
            requested: EpochSize::Auto,
            epoch_size: None,
            samples_this_epoch: 0,
            first_pass_done: false,
            pending_persist: None,
            epoch_boundary: false,
            dataset_boundary: false,
            sequence_boundary: false,
            started: false,
        })
    }

    /// Begin an epoch: reset accounting, rewind the source, return the
    /// assembler to its Empty state.
    pub fn start_epoch(&mut self, epoch: usize, requested: EpochSize) -> Result<()> {
        self.epoch = epoch;
        self.requested = requested;
        self.samples_this_epoch = 0;
        self.epoch_boundary = false;
        self.dataset_boundary = false;
        self.sequence_boundary = false;
        self.row_scratch.resize(self.encoder.row_dim(), 0.0);
        self.assembler.reset();
        self.source.rewind()?;
        self.started = true;
        Ok(())
    }

    /// Produce the next minibatch into the sinks; false signals end of epoch.
    ///
    /// Feature layout: 1 x (steps * streams) word ids, time-major
    /// stream-minor. Label layout: `mode.label_dim()` rows over the same
    /// columns.
    pub fn next_minibatch(
        &mut self,
        features: &mut dyn MatrixSink,
        labels: &mut dyn MatrixSink,
    ) -> Result<bool> {
        if !self.started {
            return Ok(false);
        }
        self.sequence_boundary = false;

        if let Some(budget) = self.epoch_budget() {
            if self.samples_this_epoch >= budget {
                self.epoch_boundary = true;
                return Ok(false);
            }
        }

        if !self.assembler.ensure_cohort(&mut self.source)? {
            self.dataset_boundary = true;
            self.epoch_boundary = true;
            self.finish_first_pass()?;
            return Ok(false);
        }

        let steps = self.assembler.steps_available();
        let streams = self.assembler.active_streams();
        let pos = self.assembler.pos_in_sentence();
        let samples = steps * streams;
        let dim = self.encoder.row_dim();

        features.resize(1, samples);
        labels.resize(dim, samples);
        self.layout.reset(streams, steps);

        for t in 0..steps {
            for s in 0..streams {
                let col = t * streams + s;

                let feature_id = self.vocab.id_for(self.assembler.token_at(s, pos + t))?;
                let label_id = self.vocab.id_for(self.assembler.token_at(s, pos + t + 1))?;

                features.set(0, col, feature_id as f32);
                self.encoder.encode_into(label_id, &mut self.row_scratch)?;
                for (row, &value) in self.row_scratch.iter().enumerate() {
                    labels.set(row, col, value);
                }

                self.layout.set(
                    s,
                    t,
                    StreamFlags {
                        seq_start: pos + t == 0,
                        seq_end: t == steps - 1 && label_id == self.end_id,
                    },
                );
            }
        }

        self.sequence_boundary =
            (0..streams).all(|s| self.layout.flags_at(s, steps - 1).seq_end);
        self.samples_this_epoch += samples as u64;
        self.assembler.advance(steps);

        Ok(true)
    }

    /// True once the current epoch has ended
    pub fn is_epoch_boundary(&self) -> bool {
        self.epoch_boundary
    }

    /// True once the underlying data source has been fully consumed
    pub fn is_dataset_boundary(&self) -> bool {
        self.dataset_boundary
    }

    /// True when the last minibatch completed its cohort's sequences
    pub fn is_sequence_boundary(&self) -> bool {
        self.sequence_boundary
    }

    /// Per-stream begin/end flags of the just-produced minibatch
    pub fn layout_of(&self) -> &MinibatchLayout {
        &self.layout
    }

    /// Streams active in the just-produced minibatch
    pub fn num_active_streams(&self) -> usize {
        self.layout.num_streams()
    }

    /// Realized dataset size, known after the first full pass
    pub fn epoch_size(&self) -> Option<u64> {
        self.epoch_size
    }

    /// Samples emitted so far this epoch
    pub fn samples_this_epoch(&self) -> u64 {
        self.samples_this_epoch
    }

    /// The vocabulary in use (possibly auto-built from the class file)
    pub fn vocab(&self) -> &VocabularyIndex {
        &self.vocab
    }

    /// The active configuration
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    fn epoch_budget(&self) -> Option<u64> {
        match self.requested {
            EpochSize::Samples(n) => Some(n),
            EpochSize::Auto => self.epoch_size,
        }
    }

    /// First dataset exhaustion fixes the realized sample count as the
    /// implicit epoch size and flushes the deferred vocabulary persist.
    fn finish_first_pass(&mut self) -> Result<()> {
        if self.first_pass_done {
            return Ok(());
        }
        self.first_pass_done = true;
        if self.epoch_size.is_none() {
            self.epoch_size = Some(self.samples_this_epoch);
        }
        if let Some(path) = self.pending_persist.take() {
            self.vocab.persist(&path, self.epoch)?;
        }
        Ok(())
    }
}
