//! Sample and chunk codecs
//!
//! `lz4` and `zstd` are byte codecs: they know nothing about dtype or shape,
//! so arrays must be cast to the tensor dtype before compressing. `npy` is
//! dtype-aware and records dtype and shape in its payload.

use serde::{Deserialize, Serialize};
use tensorchunk_core::validation::parse_shape;
use tensorchunk_core::{Dtype, FormatError};

use crate::array::SampleArray;
use crate::config::DEFAULT_ZSTD_LEVEL;
use crate::error::{Error, Result};

/// Codec applied to a sample or a whole chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Lz4,
    Zstd,
    Npy,
}

/// Byte-level compressor
pub trait Compressor: Send + Sync {
    /// Compress data
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Decompress data
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Algorithm name
    fn name(&self) -> &'static str;
}

/// LZ4 block codec with the uncompressed size prepended
#[derive(Debug, Default, Clone, Copy)]
pub struct Lz4Codec;

impl Compressor for Lz4Codec {
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(input))
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        lz4_flex::decompress_size_prepended(input).map_err(|e| Error::Compression(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "lz4"
    }
}

/// Zstandard codec
#[derive(Debug, Clone, Copy)]
pub struct ZstdCodec {
    level: i32,
}

impl ZstdCodec {
    /// Level range: 1-22
    pub fn new(level: i32) -> Result<Self> {
        if !(1..=22).contains(&level) {
            return Err(Error::Compression(format!("invalid zstd level {level}")));
        }
        Ok(Self { level })
    }
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self {
            level: DEFAULT_ZSTD_LEVEL,
        }
    }
}

impl Compressor for ZstdCodec {
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        zstd::bulk::compress(input, self.level).map_err(|e| Error::Compression(e.to_string()))
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        zstd::stream::decode_all(input).map_err(|e| Error::Compression(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "zstd"
    }
}

impl Compression {
    pub fn name(&self) -> &'static str {
        match self {
            Compression::Lz4 => "lz4",
            Compression::Zstd => "zstd",
            Compression::Npy => "npy",
        }
    }

    /// Whether the codec is blind to dtype and shape
    pub fn is_byte_compression(&self) -> bool {
        matches!(self, Compression::Lz4 | Compression::Zstd)
    }

    /// Compress opaque bytes; `npy` stores them as a `uint8` vector
    pub fn compress_bytes(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::Lz4 => Lz4Codec.compress(data),
            Compression::Zstd => ZstdCodec::default().compress(data),
            Compression::Npy => Ok(npy::encode(Dtype::U8, &[data.len()], data)),
        }
    }

    pub fn decompress_bytes(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::Lz4 => Lz4Codec.decompress(data),
            Compression::Zstd => ZstdCodec::default().decompress(data),
            Compression::Npy => Ok(npy::decode(data)?.into_data()),
        }
    }

    /// Compress an array's element bytes, recording dtype and shape if the
    /// codec can
    pub fn compress_array(&self, array: &SampleArray) -> Result<Vec<u8>> {
        match self {
            Compression::Npy => Ok(npy::encode(array.dtype(), array.shape(), array.data())),
            _ => self.compress_bytes(array.data()),
        }
    }

    /// Decode an array; byte codecs rebuild it from `shape` and `dtype`, `npy`
    /// returns the dtype and shape it recorded
    pub fn decompress_array(&self, data: &[u8], shape: &[usize], dtype: Dtype) -> Result<SampleArray> {
        match self {
            Compression::Npy => npy::decode(data),
            _ => SampleArray::new(dtype, shape.to_vec(), self.decompress_bytes(data)?),
        }
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Compression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lz4" => Ok(Compression::Lz4),
            "zstd" => Ok(Compression::Zstd),
            "npy" => Ok(Compression::Npy),
            other => Err(Error::Compression(format!("unknown compression {other}"))),
        }
    }
}

/// Minimal NPY v1.0 reader and writer for C-ordered little-endian arrays
pub(crate) mod npy {
    use super::*;

    const MAGIC: &[u8; 6] = b"\x93NUMPY";
    pub(crate) const PREAMBLE: usize = 10;
    const ALIGN: usize = 64;

    fn descr(dtype: Dtype) -> &'static str {
        match dtype {
            Dtype::Bool => "|b1",
            Dtype::U8 | Dtype::Str => "|u1",
            Dtype::U16 => "<u2",
            Dtype::U32 => "<u4",
            Dtype::U64 => "<u8",
            Dtype::I8 => "|i1",
            Dtype::I16 => "<i2",
            Dtype::I32 => "<i4",
            Dtype::I64 => "<i8",
            Dtype::F32 => "<f4",
            Dtype::F64 => "<f8",
        }
    }

    fn dtype_of(descr: &str) -> Result<Dtype> {
        let dtype = match descr {
            "|b1" => Dtype::Bool,
            "|u1" => Dtype::U8,
            "<u2" => Dtype::U16,
            "<u4" => Dtype::U32,
            "<u8" => Dtype::U64,
            "|i1" => Dtype::I8,
            "<i2" => Dtype::I16,
            "<i4" => Dtype::I32,
            "<i8" => Dtype::I64,
            "<f4" => Dtype::F32,
            "<f8" => Dtype::F64,
            _ => return Err(FormatError::UnknownDtype.into()),
        };
        Ok(dtype)
    }

    pub(super) fn encode(dtype: Dtype, shape: &[usize], data: &[u8]) -> Vec<u8> {
        let mut header = format!(
            "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
            descr(dtype),
            tensorchunk_core::canonical_shape(shape)
        );
        let unpadded = PREAMBLE + header.len() + 1;
        let padding = (ALIGN - unpadded % ALIGN) % ALIGN;
        header.extend(std::iter::repeat(' ').take(padding));
        header.push('\n');

        let mut out = Vec::with_capacity(PREAMBLE + header.len() + data.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&[1, 0]);
        out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(data);
        out
    }

    fn field<'a>(header: &'a str, key: &str) -> Result<&'a str> {
        let start = header
            .find(key)
            .map(|i| i + key.len())
            .ok_or(FormatError::InvalidHeader)?;
        Ok(header[start..].trim_start())
    }

    /// Bytes taken by the preamble and header, read from the first ten
    pub(crate) fn header_len(preamble: &[u8]) -> Result<usize> {
        if preamble.len() < PREAMBLE || &preamble[..6] != MAGIC {
            return Err(FormatError::InvalidHeader.into());
        }
        if preamble[6] != 1 {
            return Err(FormatError::UnsupportedFormat.into());
        }
        Ok(PREAMBLE + u16::from_le_bytes([preamble[8], preamble[9]]) as usize)
    }

    /// Dtype, shape and payload offset of an npy buffer
    ///
    /// Only the header needs to be present.
    pub(crate) fn parse_header(bytes: &[u8]) -> Result<(Dtype, Vec<usize>, usize)> {
        let data_start = header_len(bytes)?;
        if bytes.len() < data_start {
            return Err(FormatError::InsufficientBuffer.into());
        }
        let header =
            std::str::from_utf8(&bytes[PREAMBLE..data_start]).map_err(|_| FormatError::InvalidHeader)?;

        let descr = field(header, "'descr':")?;
        let descr = descr
            .strip_prefix('\'')
            .and_then(|d| d.split('\'').next())
            .ok_or(FormatError::InvalidHeader)?;
        let dtype = dtype_of(descr)?;

        if field(header, "'fortran_order':")?.starts_with("True") {
            return Err(FormatError::UnsupportedFormat.into());
        }

        let shape = field(header, "'shape':")?;
        let end = shape.find(')').ok_or(FormatError::InvalidHeader)?;
        Ok((dtype, parse_shape(&shape[..=end])?, data_start))
    }

    pub(super) fn decode(bytes: &[u8]) -> Result<SampleArray> {
        let (dtype, shape, data_start) = parse_header(bytes)?;
        SampleArray::new(dtype, shape, bytes[data_start..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_npy_records_dtype_and_shape() {
        let array = SampleArray::from_slice(&[2, 3], &[1i32, 2, 3, 4, 5, 6]).unwrap();
        let encoded = Compression::Npy.compress_array(&array).unwrap();
        assert_eq!(&encoded[..6], b"\x93NUMPY");
        assert_eq!((encoded.len() - array.nbytes()) % 64, 0);

        // shape and dtype arguments are ignored by npy
        let decoded = Compression::Npy
            .decompress_array(&encoded, &[6], Dtype::F64)
            .unwrap();
        assert_eq!(decoded, array);
    }

    #[test]
    fn test_npy_scalar_and_vector() {
        let scalar = SampleArray::new(Dtype::F32, vec![], 2.5f32.to_le_bytes().to_vec()).unwrap();
        let encoded = Compression::Npy.compress_array(&scalar).unwrap();
        assert_eq!(Compression::Npy.decompress_array(&encoded, &[], Dtype::F32).unwrap(), scalar);

        let text = Compression::Npy.compress_bytes(b"abc").unwrap();
        assert_eq!(Compression::Npy.decompress_bytes(&text).unwrap(), b"abc");
    }

    #[test]
    fn test_byte_codecs_need_shape() {
        let array = SampleArray::from_slice(&[2, 2], &[1u16, 2, 3, 4]).unwrap();
        for codec in [Compression::Lz4, Compression::Zstd] {
            let encoded = codec.compress_array(&array).unwrap();
            let decoded = codec.decompress_array(&encoded, &[2, 2], Dtype::U16).unwrap();
            assert_eq!(decoded, array);
            assert!(codec.decompress_array(&encoded, &[3], Dtype::U16).is_err());
        }
    }

    #[test]
    fn test_names() {
        assert_eq!("zstd".parse::<Compression>().unwrap(), Compression::Zstd);
        assert!("png".parse::<Compression>().is_err());
        assert_eq!(serde_json::to_string(&Compression::Lz4).unwrap(), "\"lz4\"");
        assert!(ZstdCodec::new(0).is_err());
    }

    proptest! {
        #[test]
        fn byte_codec_roundtrip(data in prop::collection::vec(any::<u8>(), 0..4096)) {
            for codec in [Compression::Lz4, Compression::Zstd] {
                let compressed = codec.compress_bytes(&data).unwrap();
                prop_assert_eq!(codec.decompress_bytes(&compressed).unwrap(), data.clone());
            }
        }
    }
}
