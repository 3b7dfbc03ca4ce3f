//! Generic run-length table from sample index to value
//!
//! Row `i` holds `(value, cumulative)` and owns samples
//! `[cumulative(i - 1), cumulative(i))`. Adjacent runs with equal values are
//! always coalesced, so the table stays minimal under appends and point
//! updates.

use alloc::vec::Vec;

use crate::{FormatError, Result};

/// Run-length encoded mapping from sample index to `V`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Runs<V> {
    rows: Vec<(V, u64)>,
}

impl<V> Default for Runs<V> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<V: Clone + PartialEq> Runs<V> {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw rows, validating monotonic cumulative counts
    pub fn from_rows(rows: Vec<(V, u64)>) -> Result<Self> {
        let mut previous = 0;
        for (_, cumulative) in &rows {
            if *cumulative < previous {
                return Err(FormatError::CorruptedData);
            }
            previous = *cumulative;
        }
        Ok(Self { rows })
    }

    /// Raw rows
    pub fn rows(&self) -> &[(V, u64)] {
        &self.rows
    }

    /// Total number of samples covered
    pub fn num_samples(&self) -> u64 {
        self.rows.last().map(|(_, c)| *c).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.num_samples() == 0
    }

    /// Append `count` samples mapped to `value`
    pub fn push(&mut self, value: V, count: u64) {
        if count == 0 {
            return;
        }
        let end = self.num_samples() + count;
        match self.rows.last_mut() {
            Some((last, cumulative)) if *last == value => *cumulative = end,
            _ => self.rows.push((value, end)),
        }
    }

    /// Index of the row owning `index`
    pub fn row_of(&self, index: u64) -> Result<usize> {
        let row = self.rows.partition_point(|(_, cumulative)| *cumulative <= index);
        if row >= self.rows.len() {
            return Err(FormatError::IndexOutOfBounds);
        }
        Ok(row)
    }

    /// First sample index owned by `row`
    pub fn row_start(&self, row: usize) -> u64 {
        if row == 0 {
            0
        } else {
            self.rows[row - 1].1
        }
    }

    /// Value for sample `index`
    pub fn get(&self, index: u64) -> Result<&V> {
        let row = self.row_of(index)?;
        Ok(&self.rows[row].0)
    }

    /// Overwrite the value of a single sample, splitting its run as needed
    pub fn set(&mut self, index: u64, value: V) -> Result<()> {
        let target = self.row_of(index)?;
        if self.rows[target].0 == value {
            return Ok(());
        }

        let mut rebuilt = Runs::new();
        for (row, (current, cumulative)) in self.rows.iter().enumerate() {
            let start = self.row_start(row);
            if row == target {
                rebuilt.push(current.clone(), index - start);
                rebuilt.push(value.clone(), 1);
                rebuilt.push(current.clone(), cumulative - index - 1);
            } else {
                rebuilt.push(current.clone(), cumulative - start);
            }
        }
        *self = rebuilt;
        Ok(())
    }

    /// Append every run of `other` after the samples already present
    pub fn extend_from(&mut self, other: &Runs<V>) {
        for (row, (value, cumulative)) in other.rows.iter().enumerate() {
            self.push(value.clone(), cumulative - other.row_start(row));
        }
    }
}
