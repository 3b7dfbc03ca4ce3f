//! Format constants and magic bytes for persisted encoders

/// Maximum row count accepted when decoding, to prevent memory exhaustion
pub const MAX_ROW_COUNT: u64 = 1 << 32;

/// Row table format constants
pub mod row_table {
    /// Magic bytes for a chunk id encoder
    pub const CHUNK_IDS_MAGIC: [u8; 4] = *b"CIDX";

    /// Magic bytes for a creds encoder
    pub const CREDS_MAGIC: [u8; 4] = *b"CRDX";

    /// Current row table format version
    pub const VERSION: u8 = 1;

    /// Fixed size of the row table header
    pub const HEADER_SIZE: usize = 16;

    /// Size of one `(value, cumulative)` row
    pub const ROW_SIZE: usize = 16;
}
