//! Bidirectional token to id mapping with unknown-token fallback.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use crate::classes::ClassMap;
use crate::error::{ReaderError, Result};

/// Bidirectional string to id map for one label stream.
///
/// Ids are dense and 0-based; the token/id mapping is bijective and must stay
/// fixed for the duration of a run.
#[derive(Debug, Clone, Default)]
pub struct VocabularyIndex {
    token_to_id: HashMap<String, u32>,
    id_to_token: Vec<String>,
    unk: String,
}

impl VocabularyIndex {
    /// Create an empty vocabulary with the given unknown-token fallback
    pub fn new(unk: impl Into<String>) -> Self {
        Self {
            token_to_id: HashMap::new(),
            id_to_token: Vec::new(),
            unk: unk.into(),
        }
    }

    /// Populate from a newline-delimited mapping file where line N holds the
    /// token of id N. Blank lines are skipped, tokens are trimmed.
    pub fn load(path: &Path, unk: impl Into<String>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut vocab = Self::new(unk);
        for line in content.lines() {
            let token = line.trim();
            if token.is_empty() {
                continue;
            }
            vocab.insert(token)?;
        }
        Ok(vocab)
    }

    /// Build from a class file's word table, the fallback when no mapping
    /// file exists on disk.
    pub fn from_class_map(classes: &ClassMap, unk: impl Into<String>) -> Result<Self> {
        let mut vocab = Self::new(unk);
        for id in 0..classes.vocab_size() {
            let token = classes.token_of(id as u32).ok_or_else(|| {
                ReaderError::Logic(format!("class table has no token for id {id}"))
            })?;
            vocab.insert(token)?;
        }
        Ok(vocab)
    }

    /// Append a token with the next dense id
    pub fn insert(&mut self, token: &str) -> Result<u32> {
        if self.token_to_id.contains_key(token) {
            return Err(ReaderError::DataFormat(format!(
                "duplicate token '{token}' in label mapping"
            )));
        }
        let id = self.id_to_token.len() as u32;
        self.token_to_id.insert(token.to_string(), id);
        self.id_to_token.push(token.to_string());
        Ok(id)
    }

    /// Number of mapped tokens
    pub fn len(&self) -> usize {
        self.id_to_token.len()
    }

    /// True if no tokens are mapped
    pub fn is_empty(&self) -> bool {
        self.id_to_token.is_empty()
    }

    /// The configured unknown token
    pub fn unk_token(&self) -> &str {
        &self.unk
    }

    /// Non-failing lookup
    pub fn id_of(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    /// Lookup with unknown-token fallback; unmapped tokens resolve to the unk
    /// id, and even that missing is a configuration error.
    pub fn id_for(&self, token: &str) -> Result<u32> {
        if let Some(id) = self.id_of(token) {
            return Ok(id);
        }
        self.id_of(&self.unk).ok_or_else(|| {
            ReaderError::Config(format!(
                "'{token}' not in vocabulary and unk symbol '{}' is not mapped",
                self.unk
            ))
        })
    }

    /// Reverse lookup
    pub fn token_of(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(id as usize).map(String::as_str)
    }

    /// Write the id-to-token mapping, one token per line in id order.
    ///
    /// Label maps must stay fixed across a run, so the file is only written
    /// on a fresh run's first pass; later epochs log a warning and skip.
    pub fn persist(&self, path: &Path, epoch: usize) -> Result<()> {
        if epoch > 0 {
            eprintln!(
                "Warning: label mapping {} NOT written to disk, mapping files are only written when starting at epoch zero",
                path.display()
            );
            return Ok(());
        }
        let mut file = std::fs::File::create(path)?;
        for token in &self.id_to_token {
            writeln!(file, "{token}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn sample_vocab() -> VocabularyIndex {
        let mut vocab = VocabularyIndex::new("<unk>");
        for token in ["<unk>", "<s>", "</s>", "the", "cat"] {
            vocab.insert(token).unwrap();
        }
        vocab
    }

    #[test]
    fn test_insert_assigns_dense_ids() {
        let vocab = sample_vocab();
        assert_eq!(vocab.len(), 5);
        assert_eq!(vocab.id_of("<unk>"), Some(0));
        assert_eq!(vocab.id_of("cat"), Some(4));
    }

    #[test]
    fn test_round_trip() {
        let vocab = sample_vocab();
        for token in ["<s>", "</s>", "the", "cat"] {
            let id = vocab.id_for(token).unwrap();
            assert_eq!(vocab.token_of(id), Some(token));
        }
    }

    #[test]
    fn test_unknown_falls_back_to_unk() {
        let vocab = sample_vocab();
        assert_eq!(vocab.id_for("zebra").unwrap(), vocab.id_of("<unk>").unwrap());
        assert_eq!(vocab.id_of("zebra"), None);
    }

    #[test]
    fn test_missing_unk_is_config_error() {
        let mut vocab = VocabularyIndex::new("<unk>");
        vocab.insert("the").unwrap();
        let err = vocab.id_for("zebra").unwrap_err();
        assert!(matches!(err, ReaderError::Config(_)));
    }

    #[test]
    fn test_duplicate_token_rejected() {
        let mut vocab = VocabularyIndex::new("<unk>");
        vocab.insert("the").unwrap();
        assert!(matches!(
            vocab.insert("the"),
            Err(ReaderError::DataFormat(_))
        ));
    }

    #[test]
    fn test_load_line_order_is_id_order() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "<s>\n</s>\nthe\n\ncat").unwrap();
        let vocab = VocabularyIndex::load(file.path(), "<unk>").unwrap();
        assert_eq!(vocab.len(), 4);
        assert_eq!(vocab.id_of("<s>"), Some(0));
        assert_eq!(vocab.id_of("cat"), Some(3));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err =
            VocabularyIndex::load(Path::new("/nonexistent/vocab.txt"), "<unk>").unwrap_err();
        assert!(matches!(err, ReaderError::Io(_)));
    }

    #[test]
    fn test_persist_writes_id_order() {
        let vocab = sample_vocab();
        let file = NamedTempFile::new().unwrap();
        vocab.persist(file.path(), 0).unwrap();
        let written = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(written, "<unk>\n<s>\n</s>\nthe\ncat\n");
    }

    #[test]
    fn test_persist_skipped_on_later_epoch() {
        let vocab = sample_vocab();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.txt");
        vocab.persist(&path, 3).unwrap();
        assert!(!path.exists());
    }
}
