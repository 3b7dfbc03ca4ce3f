//! Pure validation helpers for sample layout and chunk capacity
//!
//! No I/O here: only arithmetic on shapes, byte lengths and ranges.

pub mod bounds;
pub mod parsing;
pub mod ranges;

pub use bounds::{num_elements, validate_array_bounds, validate_shape_bytes};
#[cfg(feature = "alloc")]
pub use parsing::parse_shape;
pub use parsing::parse_range;
pub use ranges::{fits_in_chunk, validate_byte_range};
