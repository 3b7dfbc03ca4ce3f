//! Per-tensor metadata

use serde::{Deserialize, Serialize};
use tensorchunk_core::Dtype;

use crate::compression::Compression;
use crate::error::{Error, Result};

/// High-level sample type of a tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Htype {
    #[default]
    Generic,
    Text,
    Json,
    Image,
    Video,
}

impl Htype {
    /// Samples are stored as UTF-8 text
    pub fn is_text_like(&self) -> bool {
        matches!(self, Htype::Text | Htype::Json)
    }
}

/// Metadata describing one tensor
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TensorMeta {
    pub htype: Htype,
    pub dtype: Option<Dtype>,
    pub sample_compression: Option<Compression>,
    pub chunk_compression: Option<Compression>,
    #[serde(default)]
    pub is_link: bool,
    #[serde(default)]
    pub max_chunk_size: Option<u64>,
    pub length: u64,
    pub min_shape: Vec<usize>,
    pub max_shape: Vec<usize>,
}

impl TensorMeta {
    pub fn new(htype: Htype, dtype: Dtype) -> Self {
        let dtype = if htype.is_text_like() { Dtype::Str } else { dtype };
        Self {
            htype,
            dtype: Some(dtype),
            ..Self::default()
        }
    }

    /// Tensor of references to external data of `htype`
    pub fn linked(htype: Htype) -> Self {
        Self {
            htype,
            dtype: Some(Dtype::Str),
            is_link: true,
            ..Self::default()
        }
    }

    pub fn with_sample_compression(mut self, compression: Compression) -> Self {
        self.sample_compression = Some(compression);
        self.chunk_compression = None;
        self
    }

    pub fn with_chunk_compression(mut self, compression: Compression) -> Self {
        self.chunk_compression = Some(compression);
        self.sample_compression = None;
        self
    }

    pub fn with_max_chunk_size(mut self, max_chunk_size: u64) -> Self {
        self.max_chunk_size = Some(max_chunk_size);
        self
    }

    /// Stored payloads are UTF-8 text; linked tensors store paths
    pub fn is_text_like(&self) -> bool {
        self.htype.is_text_like() || self.is_link
    }

    pub fn dtype_or_default(&self) -> Dtype {
        self.dtype.unwrap_or(Dtype::F32)
    }

    /// No sample has ever been registered
    pub fn is_empty(&self) -> bool {
        self.min_shape.is_empty()
    }

    /// Widen the shape interval to include `shape`
    pub fn update_shape_interval(&mut self, shape: &[usize]) -> Result<()> {
        if self.is_empty() && self.length == 0 {
            self.min_shape = shape.to_vec();
            self.max_shape = shape.to_vec();
            return Ok(());
        }
        if shape.len() != self.min_shape.len() {
            return Err(Error::ShapeRankMismatch {
                expected: self.min_shape.len(),
                actual: shape.len(),
            });
        }
        for (dim, &len) in shape.iter().enumerate() {
            self.min_shape[dim] = self.min_shape[dim].min(len);
            self.max_shape[dim] = self.max_shape[dim].max(len);
        }
        Ok(())
    }

    /// Record `count` new samples of `shape`
    pub fn register_samples(&mut self, shape: &[usize], count: u64) -> Result<()> {
        self.update_shape_interval(shape)?;
        self.length += count;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_interval() {
        let mut meta = TensorMeta::new(Htype::Generic, Dtype::U8);
        meta.register_samples(&[2, 5], 1).unwrap();
        meta.register_samples(&[4, 3], 2).unwrap();
        assert_eq!(meta.length, 3);
        assert_eq!(meta.min_shape, vec![2, 3]);
        assert_eq!(meta.max_shape, vec![4, 5]);
        assert!(matches!(
            meta.register_samples(&[1], 1),
            Err(Error::ShapeRankMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_text_like() {
        assert_eq!(TensorMeta::new(Htype::Json, Dtype::F32).dtype, Some(Dtype::Str));
        assert!(TensorMeta::linked(Htype::Video).is_text_like());
        assert!(!TensorMeta::new(Htype::Image, Dtype::U8).is_text_like());
    }

    #[test]
    fn test_json_form() {
        let meta = TensorMeta::new(Htype::Image, Dtype::U8).with_sample_compression(Compression::Lz4);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["htype"], "image");
        assert_eq!(json["dtype"], "uint8");
        assert_eq!(json["sample_compression"], "lz4");
        let back: TensorMeta = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }
}
