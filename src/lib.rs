//! # lotear
//!
//! Minibatch construction for multi-stream recurrent language-model training.
//!
//! Per epoch, a stream of delimited token sequences is converted into
//! fixed-size minibatches organized for parallel-sequence recurrent
//! computation. Equal-length sequences are grouped into cohorts of parallel
//! streams, advanced in lockstep, and each target word is encoded for one of
//! three output-layer strategies: full softmax, class-based hierarchical
//! softmax, or noise-contrastive estimation (NCE).
//!
//! # Example
//!
//! ```no_run
//! use lotear::{DenseSink, EpochSize, MinibatchBuilder, ReaderConfig};
//!
//! fn example() -> lotear::Result<()> {
//!     let config = ReaderConfig::class()
//!         .with_mb_size(128)
//!         .with_num_streams(8)
//!         .with_vocab_size(10_000)
//!         .with_train_file("train.txt")
//!         .with_vocab_file("vocab.txt")
//!         .with_class_file("classes.txt");
//!
//!     let mut reader = MinibatchBuilder::open(config)?;
//!     reader.start_epoch(0, EpochSize::Auto)?;
//!
//!     let mut features = DenseSink::new();
//!     let mut labels = DenseSink::new();
//!     while reader.next_minibatch(&mut features, &mut labels)? {
//!         // feed features/labels to the training loop
//!     }
//!     Ok(())
//! }
//! ```

mod assembler;
mod classes;
mod config;
mod encoder;
mod error;
mod noise;
mod reader;
mod source;
mod vocab;

pub use assembler::SequenceAssembler;
pub use classes::{ClassMap, ClassRange};
pub use config::{EpochSize, ReaderConfig, ReaderMode, SequenceMarkers};
pub use encoder::LabelEncoder;
pub use error::{ReaderError, Result};
pub use noise::NoiseSampler;
pub use reader::{DenseSink, MatrixSink, MinibatchBuilder, MinibatchLayout, StreamFlags};
pub use source::{InMemorySource, ParsedChunk, SequenceInfo, SequenceSource, TextSequenceSource};
pub use vocab::VocabularyIndex;
