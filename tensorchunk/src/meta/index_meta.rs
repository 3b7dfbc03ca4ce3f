//! Persisted per-sample index entries
//!
//! One entry per sample, naming the chunks that hold it and its byte range.
//! For a sample spread over several chunks, `start_byte` is relative to the
//! first chunk and `end_byte` to the last.

use serde::{Deserialize, Serialize};

use crate::compression::Compression;
use crate::error::{Error, Result};

/// Location of one sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk_names: Vec<String>,
    pub start_byte: u64,
    pub end_byte: u64,
    /// `None` when the writer did not record a shape
    pub shape: Option<Vec<usize>>,
    /// `None` means the payload is raw element bytes
    pub compression: Option<Compression>,
}

impl IndexEntry {
    /// Entry for a sample held by a single chunk
    pub fn single(
        chunk_name: String,
        range: (u64, u64),
        shape: Vec<usize>,
        compression: Option<Compression>,
    ) -> Self {
        Self {
            chunk_names: vec![chunk_name],
            start_byte: range.0,
            end_byte: range.1,
            shape: Some(shape),
            compression,
        }
    }

    pub fn is_multi_chunk(&self) -> bool {
        self.chunk_names.len() > 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexMeta {
    pub entries: Vec<IndexEntry>,
}

impl IndexMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn add_entry(&mut self, entry: IndexEntry) {
        self.entries.push(entry);
    }

    pub fn get(&self, index: u64) -> Result<&IndexEntry> {
        self.entries.get(index as usize).ok_or(Error::IndexOutOfBounds {
            index,
            length: self.entries.len() as u64,
        })
    }

    pub fn get_mut(&mut self, index: u64) -> Result<&mut IndexEntry> {
        let length = self.entries.len() as u64;
        self.entries
            .get_mut(index as usize)
            .ok_or(Error::IndexOutOfBounds { index, length })
    }

    /// Append every entry of `other`
    pub fn extend_from(&mut self, other: &IndexMeta) {
        self.entries.extend(other.entries.iter().cloned());
    }

    /// Point entries held solely by chunk `from` at chunk `to`, shifting their
    /// byte ranges by `shift`. Starts at entry `first` and stops at the first
    /// entry that does not match; returns the number of entries remapped.
    pub fn remap_chunk(&mut self, first: usize, from: &str, to: &str, shift: u64) -> usize {
        let mut remapped = 0;
        for entry in self.entries.iter_mut().skip(first) {
            if entry.chunk_names.len() != 1 || entry.chunk_names[0] != from {
                break;
            }
            entry.chunk_names[0] = to.to_string();
            entry.start_byte += shift;
            entry.end_byte += shift;
            remapped += 1;
        }
        remapped
    }
}
