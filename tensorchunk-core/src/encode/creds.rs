//! Global mapping from sample index to an encoded credential key
//!
//! Value `0` means the sample needs no credentials. Other values are
//! `position + 1` in the owning credential registry.

use alloc::vec::Vec;

use super::runs::Runs;
use crate::format::constants::row_table::CREDS_MAGIC;
use crate::format::{decode_rows, encode_rows};
use crate::{FormatError, Result};

/// Encoded credential key for samples without credentials
pub const NO_CREDS: u32 = 0;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredsEncoder {
    runs: Runs<u32>,
}

impl CredsEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_samples(&self) -> u64 {
        self.runs.num_samples()
    }

    pub fn rows(&self) -> &[(u32, u64)] {
        self.runs.rows()
    }

    /// Append `count` samples using credential `encoded`
    pub fn register_samples(&mut self, encoded: u32, count: u64) {
        self.runs.push(encoded, count);
    }

    pub fn get_encoded_creds_key(&self, index: u64) -> Result<u32> {
        self.runs.get(index).copied()
    }

    /// Rewrite the credential of one sample
    pub fn set(&mut self, index: u64, encoded: u32) -> Result<()> {
        self.runs.set(index, encoded)
    }

    /// Append every sample of `other`
    pub fn extend_from(&mut self, other: &CredsEncoder) {
        self.runs.extend_from(&other.runs);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let rows: Vec<(u64, u64)> = self
            .runs
            .rows()
            .iter()
            .map(|(key, c)| (u64::from(*key), *c))
            .collect();
        encode_rows(CREDS_MAGIC, &rows)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let rows = decode_rows(CREDS_MAGIC, bytes)?
            .into_iter()
            .map(|(key, c)| {
                u32::try_from(key)
                    .map(|key| (key, c))
                    .map_err(|_| FormatError::CorruptedData)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            runs: Runs::from_rows(rows)?,
        })
    }
}
