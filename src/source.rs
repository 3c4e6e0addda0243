//! Parser boundary: chunked sequence sources.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use crate::config::SequenceMarkers;
use crate::error::Result;

/// Location of one raw sequence inside a parsed chunk's flat token buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceInfo {
    /// Offset of the first token
    pub begin: usize,
    /// Token count including boundary markers
    pub len: usize,
}

/// One fully parsed chunk; sequences are only usable once the whole chunk
/// has been produced.
#[derive(Debug, Clone, Default)]
pub struct ParsedChunk {
    /// Flat token buffer
    pub tokens: Vec<String>,
    /// Per-sequence offsets into `tokens`
    pub sequences: Vec<SequenceInfo>,
}

impl ParsedChunk {
    /// Tokens of one sequence
    pub fn sequence_tokens(&self, info: SequenceInfo) -> &[String] {
        &self.tokens[info.begin..info.begin + info.len]
    }
}

/// External parser collaborator, consumed pull-based and synchronously
pub trait SequenceSource {
    /// Parse up to `max_sequences` sequences; an empty chunk signals the end
    /// of the data source.
    fn parse(&mut self, max_sequences: usize) -> Result<ParsedChunk>;

    /// True while the underlying source has unparsed data left
    fn has_more_data(&self) -> bool;

    /// Rewind to the beginning of the source for a new epoch
    fn rewind(&mut self) -> Result<()>;
}

/// Line-delimited text corpus source.
///
/// Each non-blank line is one sequence, tokenized on whitespace. Missing
/// begin/end markers are supplied from the configured `SequenceMarkers`.
#[derive(Debug)]
pub struct TextSequenceSource {
    reader: BufReader<File>,
    markers: SequenceMarkers,
    exhausted: bool,
}

impl TextSequenceSource {
    /// Open a corpus file
    pub fn open(path: &Path, markers: SequenceMarkers) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            markers,
            exhausted: false,
        })
    }
}

impl SequenceSource for TextSequenceSource {
    fn parse(&mut self, max_sequences: usize) -> Result<ParsedChunk> {
        let mut chunk = ParsedChunk::default();
        let mut line = String::new();

        while chunk.sequences.len() < max_sequences {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                self.exhausted = true;
                break;
            }

            let mut tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }
            if !self.markers.begin.is_empty()
                && !tokens[0].eq_ignore_ascii_case(&self.markers.begin)
            {
                tokens.insert(0, &self.markers.begin);
            }
            if !self.markers.end.is_empty()
                && !tokens[tokens.len() - 1].eq_ignore_ascii_case(&self.markers.end)
            {
                tokens.push(&self.markers.end);
            }

            let begin = chunk.tokens.len();
            let len = tokens.len();
            chunk.tokens.extend(tokens.into_iter().map(String::from));
            chunk.sequences.push(SequenceInfo { begin, len });
        }

        Ok(chunk)
    }

    fn has_more_data(&self) -> bool {
        !self.exhausted
    }

    fn rewind(&mut self) -> Result<()> {
        self.reader.seek(SeekFrom::Start(0))?;
        self.exhausted = false;
        Ok(())
    }
}

/// Pre-tokenized in-memory source, for tests and already-parsed corpora
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    sequences: Vec<Vec<String>>,
    cursor: usize,
}

impl InMemorySource {
    /// Wrap complete sequences (boundary markers included by the caller)
    pub fn new<S: Into<String>, I: IntoIterator<Item = S>>(
        sequences: impl IntoIterator<Item = I>,
    ) -> Self {
        Self {
            sequences: sequences
                .into_iter()
                .map(|seq| seq.into_iter().map(Into::into).collect())
                .collect(),
            cursor: 0,
        }
    }
}

impl SequenceSource for InMemorySource {
    fn parse(&mut self, max_sequences: usize) -> Result<ParsedChunk> {
        let mut chunk = ParsedChunk::default();
        while self.cursor < self.sequences.len() && chunk.sequences.len() < max_sequences {
            let seq = &self.sequences[self.cursor];
            chunk.sequences.push(SequenceInfo {
                begin: chunk.tokens.len(),
                len: seq.len(),
            });
            chunk.tokens.extend(seq.iter().cloned());
            self.cursor += 1;
        }
        Ok(chunk)
    }

    fn has_more_data(&self) -> bool {
        self.cursor < self.sequences.len()
    }

    fn rewind(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }
}
