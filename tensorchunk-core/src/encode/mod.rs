//! Run-length encoders for chunk headers and tensor-level indexes

pub mod byte_positions;
pub mod chunk_ids;
pub mod creds;
pub mod runs;
pub mod shapes;

pub use byte_positions::BytePositionsEncoder;
pub use chunk_ids::ChunkIdEncoder;
pub use creds::{CredsEncoder, NO_CREDS};
pub use runs::Runs;
pub use shapes::ShapesEncoder;
