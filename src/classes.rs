//! Word class partition for class-based hierarchical softmax.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{ReaderError, Result};

/// Half-open `[begin, end)` id range owned by one class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassRange {
    pub begin: u32,
    pub end: u32,
}

/// Partition of the output vocabulary into classes.
///
/// Class ids must be non-decreasing as word ids increase; the resulting
/// ranges are contiguous, disjoint, and cover `[0, vocab_size)` exactly.
#[derive(Debug, Clone)]
pub struct ClassMap {
    id_to_token: Vec<String>,
    token_to_id: HashMap<String, u32>,
    id_to_class: Vec<u32>,
    id_to_count: Vec<f64>,
    ranges: Vec<ClassRange>,
}

impl ClassMap {
    /// Load a class file of lines `id count token classId`.
    ///
    /// `expected_vocab` greater than zero enables the size consistency check
    /// against the declared vocabulary dimension.
    pub fn load(path: &Path, expected_vocab: usize) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        let mut rows: Vec<(u32, f64, String, u32)> = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 4 {
                return Err(ReaderError::DataFormat(format!(
                    "class file {}:{}: expected 4 fields `id count token classId`, found {}",
                    path.display(),
                    lineno + 1,
                    fields.len()
                )));
            }
            let id: u32 = fields[0].parse().map_err(|_| {
                ReaderError::DataFormat(format!(
                    "class file {}:{}: invalid word id '{}'",
                    path.display(),
                    lineno + 1,
                    fields[0]
                ))
            })?;
            let count: f64 = fields[1].parse().map_err(|_| {
                ReaderError::DataFormat(format!(
                    "class file {}:{}: invalid count '{}'",
                    path.display(),
                    lineno + 1,
                    fields[1]
                ))
            })?;
            let class: u32 = fields[3].parse().map_err(|_| {
                ReaderError::DataFormat(format!(
                    "class file {}:{}: invalid class id '{}'",
                    path.display(),
                    lineno + 1,
                    fields[3]
                ))
            })?;
            rows.push((id, count, fields[2].to_string(), class));
        }

        if expected_vocab > 0 && rows.len() != expected_vocab {
            return Err(ReaderError::Config(format!(
                "vocabulary size {} from configuration and {} from class file {} are not consistent",
                expected_vocab,
                rows.len(),
                path.display()
            )));
        }

        let vocab_size = rows.len();
        let mut id_to_token = vec![String::new(); vocab_size];
        let mut id_to_class = vec![0u32; vocab_size];
        let mut id_to_count = vec![0f64; vocab_size];
        let mut token_to_id = HashMap::with_capacity(vocab_size);
        let mut seen = vec![false; vocab_size];

        for (id, count, token, class) in rows {
            let idx = id as usize;
            if idx >= vocab_size || seen[idx] {
                return Err(ReaderError::DataFormat(format!(
                    "class file {}: word ids must be dense and unique, offending id {id}",
                    path.display()
                )));
            }
            seen[idx] = true;
            token_to_id.insert(token.clone(), id);
            id_to_token[idx] = token;
            id_to_class[idx] = class;
            id_to_count[idx] = count;
        }

        let ranges = build_ranges(&id_to_class)?;

        Ok(Self {
            id_to_token,
            token_to_id,
            id_to_class,
            id_to_count,
            ranges,
        })
    }

    /// Output vocabulary size covered by the partition
    pub fn vocab_size(&self) -> usize {
        self.id_to_class.len()
    }

    /// Number of classes
    pub fn class_count(&self) -> usize {
        self.ranges.len()
    }

    /// Class owning the given word id
    pub fn class_of(&self, id: u32) -> Option<u32> {
        self.id_to_class.get(id as usize).copied()
    }

    /// `[begin, end)` id range of the given class
    pub fn range_of(&self, class: u32) -> Option<ClassRange> {
        self.ranges.get(class as usize).copied()
    }

    /// Token of the given word id
    pub fn token_of(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(id as usize).map(String::as_str)
    }

    /// Word id of the given token
    pub fn id_of(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    /// Per-id unigram counts, the noise distribution source
    pub fn counts(&self) -> &[f64] {
        &self.id_to_count
    }
}

/// Scan word ids in ascending order and record one `[begin, end)` range per
/// class; the last class's end is the vocabulary size.
fn build_ranges(id_to_class: &[u32]) -> Result<Vec<ClassRange>> {
    let mut prev: i64 = -1;
    for (id, &class) in id_to_class.iter().enumerate() {
        if i64::from(class) < prev {
            return Err(ReaderError::Logic(format!(
                "class file not sorted by class: word id {id} has class {class} after class {prev}"
            )));
        }
        prev = i64::from(class);
    }

    let class_count = id_to_class.iter().copied().max().map_or(0, |m| m as usize + 1);
    let mut ranges = Vec::with_capacity(class_count);
    let mut id = 0usize;
    for class in 0..class_count {
        let begin = id;
        while id < id_to_class.len() && id_to_class[id] == class as u32 {
            id += 1;
        }
        ranges.push(ClassRange {
            begin: begin as u32,
            end: id as u32,
        });
    }
    Ok(ranges)
}
