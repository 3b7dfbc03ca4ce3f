//! Conversions between samples and stored payloads

use serde_json::Value;
use tensorchunk_core::Dtype;

use crate::array::SampleArray;
use crate::error::{Error, Result};
use crate::meta::Htype;
use crate::sample::{Sample, SampleValue, SerializedSample};

/// UTF-8 payload of a text-like sample
///
/// JSON tensors store the JSON document; text tensors store the raw string.
pub fn text_to_bytes(sample: &Sample, htype: Htype) -> Result<Vec<u8>> {
    match (sample, htype) {
        (Sample::Json(value), Htype::Json) => Ok(serde_json::to_vec(value)?),
        (Sample::Text(text), Htype::Json) => Ok(serde_json::to_vec(&Value::String(text.clone()))?),
        (Sample::Text(text), _) => Ok(text.as_bytes().to_vec()),
        (Sample::Json(Value::String(text)), _) => Ok(text.as_bytes().to_vec()),
        (Sample::Array(array), _) if array.dtype() == Dtype::Str => Ok(array.data().to_vec()),
        (other, _) => Err(Error::SampleKind {
            expected: "text",
            actual: other.kind(),
        }),
    }
}

/// Decode a text-like payload
pub fn bytes_to_text(bytes: &[u8], htype: Htype) -> Result<SampleValue> {
    if htype == Htype::Json {
        return Ok(SampleValue::Json(serde_json::from_slice(bytes)?));
    }
    let text = std::str::from_utf8(bytes)
        .map_err(|_| Error::Format(tensorchunk_core::FormatError::CorruptedData))?;
    Ok(SampleValue::Text(text.to_string()))
}

/// Rank-0 samples are stored with shape `(1,)`
pub fn normalize_shape(shape: &[usize]) -> Vec<usize> {
    if shape.is_empty() {
        vec![1]
    } else {
        shape.to_vec()
    }
}

/// Decode any array-carrying sample into an array of its stored dtype
pub fn sample_to_array(sample: Sample, dtype: Dtype) -> Result<SampleArray> {
    match sample {
        Sample::Array(array) => Ok(array),
        Sample::Serialized(SerializedSample {
            buffer,
            compression: None,
            shape,
        }) => SampleArray::new(dtype, shape, buffer),
        Sample::Serialized(SerializedSample {
            buffer,
            compression: Some(compression),
            shape,
        }) => compression.decompress_array(&buffer, &shape, dtype),
        other => Err(Error::SampleKind {
            expected: "array",
            actual: other.kind(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_payloads() {
        assert_eq!(text_to_bytes(&Sample::from("hi"), Htype::Text).unwrap(), b"hi");
        assert_eq!(text_to_bytes(&Sample::from("hi"), Htype::Json).unwrap(), b"\"hi\"");
        assert_eq!(
            text_to_bytes(&Sample::from(json!({"a": [1, 2]})), Htype::Json).unwrap(),
            br#"{"a":[1,2]}"#
        );
        let array = Sample::from(SampleArray::from_vec(vec![1u8]));
        assert!(text_to_bytes(&array, Htype::Text).is_err());
    }

    #[test]
    fn test_decode_text() {
        assert_eq!(
            bytes_to_text(br#"{"a":1}"#, Htype::Json).unwrap(),
            SampleValue::Json(json!({"a": 1}))
        );
        assert_eq!(
            bytes_to_text(b"s3://b/k", Htype::Image).unwrap(),
            SampleValue::Text("s3://b/k".into())
        );
        assert!(bytes_to_text(&[0xff, 0xfe], Htype::Text).is_err());
    }

    #[test]
    fn test_normalize_shape() {
        assert_eq!(normalize_shape(&[]), vec![1]);
        assert_eq!(normalize_shape(&[3, 4]), vec![3, 4]);
    }
}
