//! Reader configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ReaderError, Result};

/// Sequence boundary and fallback markers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceMarkers {
    /// Beginning of sequence
    pub begin: String,
    /// End of sequence
    pub end: String,
    /// Unknown token
    pub unk: String,
}

impl Default for SequenceMarkers {
    fn default() -> Self {
        Self {
            begin: "<s>".to_string(),
            end: "</s>".to_string(),
            unk: "<unk>".to_string(),
        }
    }
}

/// Output-layer training strategy the labels are encoded for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReaderMode {
    /// Full softmax: one word id per sample
    Softmax,
    /// Class-based hierarchical softmax: word id plus class id and class range
    Class,
    /// Noise-contrastive estimation with `samples` negative draws per sample
    Nce { samples: usize },
}

impl ReaderMode {
    /// Resolve a mode name from configuration text
    pub fn from_name(name: &str, noise_samples: usize) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "softmax" => Ok(Self::Softmax),
            "class" => Ok(Self::Class),
            "nce" => Ok(Self::Nce {
                samples: noise_samples,
            }),
            other => Err(ReaderError::Config(format!(
                "unsupported label mode '{other}' (expected softmax, class, or nce)"
            ))),
        }
    }

    /// Number of rows one encoded label occupies
    pub fn label_dim(&self) -> usize {
        match self {
            Self::Softmax => 1,
            Self::Class => 4,
            Self::Nce { samples } => 2 * (samples + 1),
        }
    }
}

/// Requested number of samples for one epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpochSize {
    /// Use the realized sample count of the first full pass over the data
    Auto,
    /// Fixed sample budget
    Samples(u64),
}

/// Reader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Maximum timesteps offered per minibatch call
    pub mb_size: usize,
    /// Requested number of parallel sequences advanced in lockstep
    pub num_streams: usize,
    /// Label encoding mode
    pub mode: ReaderMode,
    /// Sequence markers
    pub markers: SequenceMarkers,
    /// Declared output vocabulary size; 0 skips the consistency check
    pub vocab_size: usize,
    /// Training corpus, one sequence per line
    pub train_file: Option<PathBuf>,
    /// Label mapping file, line N holds the token of id N
    pub vocab_file: Option<PathBuf>,
    /// Word class file, lines of `id count token classId`
    pub class_file: Option<PathBuf>,
    /// Maximum sequences parsed per chunk
    pub max_chunk_sequences: usize,
    /// Fixed shuffle seed for reproducible epochs
    pub shuffle_seed: Option<u64>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            mb_size: 128,
            num_streams: 1,
            mode: ReaderMode::Softmax,
            markers: SequenceMarkers::default(),
            vocab_size: 0,
            train_file: None,
            vocab_file: None,
            class_file: None,
            max_chunk_sequences: 50_000,
            shuffle_seed: None,
        }
    }
}

impl ReaderConfig {
    /// Create a softmax-mode config
    pub fn softmax() -> Self {
        Self::default()
    }

    /// Create a class-mode config
    pub fn class() -> Self {
        Self {
            mode: ReaderMode::Class,
            ..Default::default()
        }
    }

    /// Create an NCE-mode config with `samples` negative draws per label
    pub fn nce(samples: usize) -> Self {
        Self {
            mode: ReaderMode::Nce { samples },
            ..Default::default()
        }
    }

    /// Set the minibatch size
    pub fn with_mb_size(mut self, mb_size: usize) -> Self {
        self.mb_size = mb_size;
        self
    }

    /// Set the number of parallel streams
    pub fn with_num_streams(mut self, num_streams: usize) -> Self {
        self.num_streams = num_streams;
        self
    }

    /// Set the declared vocabulary size
    pub fn with_vocab_size(mut self, vocab_size: usize) -> Self {
        self.vocab_size = vocab_size;
        self
    }

    /// Set the training corpus path
    pub fn with_train_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.train_file = Some(path.into());
        self
    }

    /// Set the label mapping file path
    pub fn with_vocab_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.vocab_file = Some(path.into());
        self
    }

    /// Set the word class file path
    pub fn with_class_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.class_file = Some(path.into());
        self
    }

    /// Set a fixed shuffle seed
    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    /// Check structural validity; fatal at startup, never retried
    pub fn validate(&self) -> Result<()> {
        if self.mb_size == 0 {
            return Err(ReaderError::Config("mb_size must be at least 1".into()));
        }
        if self.num_streams == 0 {
            return Err(ReaderError::Config("num_streams must be at least 1".into()));
        }
        if self.max_chunk_sequences == 0 {
            return Err(ReaderError::Config(
                "max_chunk_sequences must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ReaderError::Config(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| ReaderError::Config(e.to_string()))
    }
}
