//! Typed n-dimensional sample arrays
//!
//! Payloads are little-endian element bytes. Typed access goes through
//! `bytemuck`, casting through the core `Element` trait.

use bytemuck::Pod;
use tensorchunk_core::validation::{num_elements, validate_shape_bytes};
use tensorchunk_core::{Dtype, Element};

use crate::error::{Error, Result};
use crate::index::DimIndex;

/// Dense array with a runtime dtype
#[derive(Debug, Clone, PartialEq)]
pub struct SampleArray {
    dtype: Dtype,
    shape: Vec<usize>,
    data: Vec<u8>,
}

impl SampleArray {
    /// Wrap raw element bytes, checking they match `shape`
    pub fn new(dtype: Dtype, shape: Vec<usize>, data: Vec<u8>) -> Result<Self> {
        validate_shape_bytes(&shape, dtype, data.len())?;
        Ok(Self { dtype, shape, data })
    }

    /// Build from typed elements
    pub fn from_slice<T: Element>(shape: &[usize], values: &[T]) -> Result<Self> {
        Self::new(T::DTYPE, shape.to_vec(), bytemuck::cast_slice(values).to_vec())
    }

    /// One-dimensional array of typed elements
    pub fn from_vec<T: Element>(values: Vec<T>) -> Self {
        let shape = vec![values.len()];
        Self {
            dtype: T::DTYPE,
            shape,
            data: bytemuck::cast_slice(&values).to_vec(),
        }
    }

    /// UTF-8 text as a `str` array of its bytes
    pub fn from_text(text: &str) -> Self {
        Self {
            dtype: Dtype::Str,
            shape: vec![text.len()],
            data: text.as_bytes().to_vec(),
        }
    }

    /// Booleans stored one byte each
    pub fn from_bools(shape: &[usize], values: &[bool]) -> Result<Self> {
        let data = values.iter().map(|b| u8::from(*b)).collect();
        Self::new(Dtype::Bool, shape.to_vec(), data)
    }

    /// Zero-filled array
    pub fn zeros(dtype: Dtype, shape: &[usize]) -> Result<Self> {
        let count = num_elements(shape)?;
        let len = count
            .checked_mul(dtype.size_bytes())
            .ok_or(tensorchunk_core::FormatError::ArraySizeOverflow)?;
        Ok(Self {
            dtype,
            shape: shape.to_vec(),
            data: vec![0; len],
        })
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn nbytes(&self) -> usize {
        self.data.len()
    }

    pub fn num_elements(&self) -> usize {
        self.data.len() / self.dtype.size_bytes()
    }

    /// Copy out typed elements; the dtype must match `T`
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if T::DTYPE != self.dtype {
            return Err(Error::DtypeMismatch {
                expected: self.dtype,
                actual: T::DTYPE,
            });
        }
        Ok(bytemuck::pod_collect_to_vec(&self.data))
    }

    /// Payload of a `str` array as text
    pub fn as_text(&self) -> Result<&str> {
        std::str::from_utf8(&self.data)
            .map_err(|_| Error::Format(tensorchunk_core::FormatError::CorruptedData))
    }

    /// Same elements under a new shape
    pub fn reshape(mut self, shape: Vec<usize>) -> Result<Self> {
        validate_shape_bytes(&shape, self.dtype, self.data.len())?;
        self.shape = shape;
        Ok(self)
    }

    /// Drop a leading dimension of length one
    pub fn squeeze_leading(mut self) -> Self {
        if self.shape.first() == Some(&1) {
            self.shape.remove(0);
        }
        self
    }

    /// Convert every element to `dtype`
    pub fn cast(&self, dtype: Dtype) -> Result<Self> {
        if dtype == self.dtype {
            return Ok(self.clone());
        }
        if !dtype.is_numeric() || !self.dtype.is_numeric() {
            return Err(Error::DtypeMismatch {
                expected: dtype,
                actual: self.dtype,
            });
        }

        let mut data = Vec::with_capacity(self.num_elements() * dtype.size_bytes());
        let elements = self.data.chunks_exact(self.dtype.size_bytes());
        if is_float(dtype) || is_float(self.dtype) {
            for element in elements {
                write_f64(dtype, read_f64(self.dtype, element), &mut data);
            }
        } else {
            // Integers wrap like `as` without a lossy f64 detour
            for element in elements {
                write_i128(dtype, read_i128(self.dtype, element), &mut data);
            }
        }
        Ok(Self {
            dtype,
            shape: self.shape.clone(),
            data,
        })
    }

    /// Element at a flat position as f64
    pub fn get_f64(&self, flat_index: usize) -> Option<f64> {
        let size = self.dtype.size_bytes();
        let bytes = self.data.get(flat_index * size..(flat_index + 1) * size)?;
        Some(read_f64(self.dtype, bytes))
    }

    /// Sub-select dimensions; integer entries drop their dimension
    ///
    /// Entries beyond the array's rank are rejected; missing trailing entries
    /// select the full extent.
    pub fn select(&self, index: &[DimIndex]) -> Result<Self> {
        if index.is_empty() {
            return Ok(self.clone());
        }
        if index.len() > self.shape.len() {
            return Err(Error::InvalidShape {
                expected: self.shape.clone(),
                actual: vec![index.len()],
            });
        }

        let mut positions = Vec::with_capacity(self.shape.len());
        let mut out_shape = Vec::with_capacity(self.shape.len());
        for (dim, &len) in self.shape.iter().enumerate() {
            let entry = index.get(dim).copied().unwrap_or_else(DimIndex::full);
            let selected = entry.positions(len)?;
            if !entry.is_int() {
                out_shape.push(selected.len());
            }
            positions.push(selected);
        }

        let mut strides = vec![1usize; self.shape.len()];
        for dim in (0..self.shape.len().saturating_sub(1)).rev() {
            strides[dim] = strides[dim + 1] * self.shape[dim + 1];
        }

        let size = self.dtype.size_bytes();
        let total: usize = positions.iter().map(Vec::len).product();
        let mut data = Vec::with_capacity(total * size);
        let mut cursor = vec![0usize; positions.len()];
        if total > 0 {
            'outer: loop {
                let flat: usize = cursor
                    .iter()
                    .enumerate()
                    .map(|(dim, &c)| positions[dim][c] * strides[dim])
                    .sum();
                data.extend_from_slice(&self.data[flat * size..(flat + 1) * size]);

                let mut dim = cursor.len();
                while dim > 0 {
                    dim -= 1;
                    cursor[dim] += 1;
                    if cursor[dim] < positions[dim].len() {
                        continue 'outer;
                    }
                    cursor[dim] = 0;
                }
                break;
            }
        }

        Ok(Self {
            dtype: self.dtype,
            shape: out_shape,
            data,
        })
    }

    /// Concatenate arrays along a new leading axis
    pub fn stack(arrays: &[SampleArray]) -> Result<Self> {
        let first = arrays.first().ok_or_else(|| Error::InvalidShape {
            expected: vec![1],
            actual: vec![0],
        })?;
        let mut data = Vec::with_capacity(first.nbytes() * arrays.len());
        for array in arrays {
            if array.shape != first.shape {
                return Err(Error::InvalidShape {
                    expected: first.shape.clone(),
                    actual: array.shape.clone(),
                });
            }
            if array.dtype != first.dtype {
                return Err(Error::DtypeMismatch {
                    expected: first.dtype,
                    actual: array.dtype,
                });
            }
            data.extend_from_slice(&array.data);
        }
        let mut shape = vec![arrays.len()];
        shape.extend_from_slice(&first.shape);
        Ok(Self {
            dtype: first.dtype,
            shape,
            data,
        })
    }
}

fn read_pod<T: Pod>(bytes: &[u8]) -> T {
    bytemuck::pod_read_unaligned(bytes)
}

fn read_f64(dtype: Dtype, bytes: &[u8]) -> f64 {
    match dtype {
        Dtype::Bool => f64::from(u8::from(bytes[0] != 0)),
        Dtype::U8 | Dtype::Str => f64::from(bytes[0]),
        Dtype::U16 => read_pod::<u16>(bytes).to_f64(),
        Dtype::U32 => read_pod::<u32>(bytes).to_f64(),
        Dtype::U64 => read_pod::<u64>(bytes).to_f64(),
        Dtype::I8 => read_pod::<i8>(bytes).to_f64(),
        Dtype::I16 => read_pod::<i16>(bytes).to_f64(),
        Dtype::I32 => read_pod::<i32>(bytes).to_f64(),
        Dtype::I64 => read_pod::<i64>(bytes).to_f64(),
        Dtype::F32 => read_pod::<f32>(bytes).to_f64(),
        Dtype::F64 => read_pod::<f64>(bytes),
    }
}

fn is_float(dtype: Dtype) -> bool {
    matches!(dtype, Dtype::F32 | Dtype::F64)
}

fn read_i128(dtype: Dtype, bytes: &[u8]) -> i128 {
    match dtype {
        Dtype::Bool => i128::from(bytes[0] != 0),
        Dtype::U8 | Dtype::Str => i128::from(bytes[0]),
        Dtype::U16 => i128::from(read_pod::<u16>(bytes)),
        Dtype::U32 => i128::from(read_pod::<u32>(bytes)),
        Dtype::U64 => i128::from(read_pod::<u64>(bytes)),
        Dtype::I8 => i128::from(read_pod::<i8>(bytes)),
        Dtype::I16 => i128::from(read_pod::<i16>(bytes)),
        Dtype::I32 => i128::from(read_pod::<i32>(bytes)),
        Dtype::I64 => i128::from(read_pod::<i64>(bytes)),
        Dtype::F32 => read_pod::<f32>(bytes) as i128,
        Dtype::F64 => read_pod::<f64>(bytes) as i128,
    }
}

fn write_i128(dtype: Dtype, value: i128, out: &mut Vec<u8>) {
    match dtype {
        Dtype::Bool => out.push(u8::from(value != 0)),
        Dtype::U8 | Dtype::Str => out.push(value as u8),
        Dtype::U16 => out.extend_from_slice(bytemuck::bytes_of(&(value as u16))),
        Dtype::U32 => out.extend_from_slice(bytemuck::bytes_of(&(value as u32))),
        Dtype::U64 => out.extend_from_slice(bytemuck::bytes_of(&(value as u64))),
        Dtype::I8 => out.extend_from_slice(bytemuck::bytes_of(&(value as i8))),
        Dtype::I16 => out.extend_from_slice(bytemuck::bytes_of(&(value as i16))),
        Dtype::I32 => out.extend_from_slice(bytemuck::bytes_of(&(value as i32))),
        Dtype::I64 => out.extend_from_slice(bytemuck::bytes_of(&(value as i64))),
        Dtype::F32 => out.extend_from_slice(bytemuck::bytes_of(&(value as f32))),
        Dtype::F64 => out.extend_from_slice(bytemuck::bytes_of(&(value as f64))),
    }
}

fn write_f64(dtype: Dtype, value: f64, out: &mut Vec<u8>) {
    fn push<T: Element>(value: f64, out: &mut Vec<u8>) {
        out.extend_from_slice(bytemuck::bytes_of(&T::from_f64(value)));
    }

    match dtype {
        Dtype::Bool => out.push(u8::from(value != 0.0)),
        Dtype::U8 | Dtype::Str => push::<u8>(value, out),
        Dtype::U16 => push::<u16>(value, out),
        Dtype::U32 => push::<u32>(value, out),
        Dtype::U64 => push::<u64>(value, out),
        Dtype::I8 => push::<i8>(value, out),
        Dtype::I16 => push::<i16>(value, out),
        Dtype::I32 => push::<i32>(value, out),
        Dtype::I64 => push::<i64>(value, out),
        Dtype::F32 => push::<f32>(value, out),
        Dtype::F64 => push::<f64>(value, out),
    }
}
