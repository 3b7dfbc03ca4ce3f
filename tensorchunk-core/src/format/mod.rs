//! Binary format definitions for persisted chunk metadata
//!
//! This module contains pure layout definitions for the encoders' on-disk
//! form. No I/O operations, only byte layouts and their validation.

pub mod constants;
pub mod row_table;

pub use row_table::RowTableHeader;
#[cfg(feature = "alloc")]
pub use row_table::{decode_rows, encode_rows};
