//! Sample dtypes and the element trait used for typed access
//!
//! Every sample of a tensor shares one dtype. Array payloads are stored as
//! little-endian element bytes; `Element` gives typed views and numeric
//! casting between dtypes.

use crate::{FormatError, Result};

/// Dtypes a tensor can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[repr(u8)]
pub enum Dtype {
    Bool = 0,
    #[cfg_attr(feature = "serde", serde(rename = "uint8"))]
    U8 = 1,
    #[cfg_attr(feature = "serde", serde(rename = "uint16"))]
    U16 = 2,
    #[cfg_attr(feature = "serde", serde(rename = "uint32"))]
    U32 = 3,
    #[cfg_attr(feature = "serde", serde(rename = "uint64"))]
    U64 = 4,
    #[cfg_attr(feature = "serde", serde(rename = "int8"))]
    I8 = 5,
    #[cfg_attr(feature = "serde", serde(rename = "int16"))]
    I16 = 6,
    #[cfg_attr(feature = "serde", serde(rename = "int32"))]
    I32 = 7,
    #[cfg_attr(feature = "serde", serde(rename = "int64"))]
    I64 = 8,
    #[cfg_attr(feature = "serde", serde(rename = "float32"))]
    F32 = 9,
    #[cfg_attr(feature = "serde", serde(rename = "float64"))]
    F64 = 10,
    /// UTF-8 text, one byte per element
    Str = 11,
}

impl Dtype {
    /// Get the size in bytes of one element
    pub const fn size_bytes(&self) -> usize {
        match self {
            Dtype::Bool | Dtype::U8 | Dtype::I8 | Dtype::Str => 1,
            Dtype::U16 | Dtype::I16 => 2,
            Dtype::U32 | Dtype::I32 | Dtype::F32 => 4,
            Dtype::U64 | Dtype::I64 | Dtype::F64 => 8,
        }
    }

    /// Parse the on-disk tag
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Dtype::Bool),
            1 => Some(Dtype::U8),
            2 => Some(Dtype::U16),
            3 => Some(Dtype::U32),
            4 => Some(Dtype::U64),
            5 => Some(Dtype::I8),
            6 => Some(Dtype::I16),
            7 => Some(Dtype::I32),
            8 => Some(Dtype::I64),
            9 => Some(Dtype::F32),
            10 => Some(Dtype::F64),
            11 => Some(Dtype::Str),
            _ => None,
        }
    }

    /// Canonical lowercase name
    pub const fn name(&self) -> &'static str {
        match self {
            Dtype::Bool => "bool",
            Dtype::U8 => "uint8",
            Dtype::U16 => "uint16",
            Dtype::U32 => "uint32",
            Dtype::U64 => "uint64",
            Dtype::I8 => "int8",
            Dtype::I16 => "int16",
            Dtype::I32 => "int32",
            Dtype::I64 => "int64",
            Dtype::F32 => "float32",
            Dtype::F64 => "float64",
            Dtype::Str => "str",
        }
    }

    /// Parse a canonical name
    pub fn from_name(name: &str) -> Result<Self> {
        let dtype = match name {
            "bool" => Dtype::Bool,
            "uint8" => Dtype::U8,
            "uint16" => Dtype::U16,
            "uint32" => Dtype::U32,
            "uint64" => Dtype::U64,
            "int8" => Dtype::I8,
            "int16" => Dtype::I16,
            "int32" => Dtype::I32,
            "int64" => Dtype::I64,
            "float32" => Dtype::F32,
            "float64" => Dtype::F64,
            "str" => Dtype::Str,
            _ => return Err(FormatError::UnknownDtype),
        };
        Ok(dtype)
    }

    /// Whether values of this dtype can be numerically cast
    pub const fn is_numeric(&self) -> bool {
        !matches!(self, Dtype::Str)
    }
}

impl core::fmt::Display for Dtype {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Trait for types that can be stored as array elements
///
/// Elements are plain-old-data so byte buffers can be viewed and collected
/// without copies beyond alignment fixes. `from_f64`/`to_f64` are the common
/// currency for casting between dtypes.
pub trait Element: bytemuck::Pod + PartialEq + core::fmt::Debug {
    /// Dtype tag for this element type
    const DTYPE: Dtype;

    /// Convert from f64 for generic casting
    fn from_f64(value: f64) -> Self;

    /// Convert to f64 for generic casting
    fn to_f64(self) -> f64;
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:expr),* $(,)?) => {
        $(
            impl Element for $ty {
                const DTYPE: Dtype = $dtype;

                fn from_f64(value: f64) -> Self {
                    value as $ty
                }

                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_element! {
    u8 => Dtype::U8,
    u16 => Dtype::U16,
    u32 => Dtype::U32,
    u64 => Dtype::U64,
    i8 => Dtype::I8,
    i16 => Dtype::I16,
    i32 => Dtype::I32,
    i64 => Dtype::I64,
    f32 => Dtype::F32,
    f64 => Dtype::F64,
}
