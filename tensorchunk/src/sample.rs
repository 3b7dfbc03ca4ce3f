//! Samples accepted by chunks and values returned by reads

use serde_json::Value;

use crate::array::SampleArray;
use crate::compression::Compression;
use crate::error::{Error, Result};

/// Reference to data stored outside the tensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedSample {
    /// Path or URI of the referenced object
    pub path: String,
    /// Key of the credentials needed to fetch it
    pub creds_key: Option<String>,
}

impl LinkedSample {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            creds_key: None,
        }
    }

    pub fn with_creds(path: impl Into<String>, creds_key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            creds_key: Some(creds_key.into()),
        }
    }
}

/// Payload already in its stored form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedSample {
    pub buffer: Vec<u8>,
    pub compression: Option<Compression>,
    pub shape: Vec<usize>,
}

/// A sample offered for writing
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    Array(SampleArray),
    /// Output of a previous serialization, reused without recompressing
    Serialized(SerializedSample),
    Text(String),
    Json(Value),
    Link(LinkedSample),
}

impl Sample {
    /// Short name of the variant, used in errors
    pub fn kind(&self) -> &'static str {
        match self {
            Sample::Array(_) => "array",
            Sample::Serialized(_) => "serialized",
            Sample::Text(_) => "text",
            Sample::Json(_) => "json",
            Sample::Link(_) => "linked",
        }
    }

    pub fn as_link(&self) -> Option<&LinkedSample> {
        match self {
            Sample::Link(link) => Some(link),
            _ => None,
        }
    }
}

impl From<SampleArray> for Sample {
    fn from(array: SampleArray) -> Self {
        Sample::Array(array)
    }
}

impl From<&str> for Sample {
    fn from(text: &str) -> Self {
        Sample::Text(text.to_string())
    }
}

impl From<String> for Sample {
    fn from(text: String) -> Self {
        Sample::Text(text)
    }
}

impl From<Value> for Sample {
    fn from(value: Value) -> Self {
        Sample::Json(value)
    }
}

impl From<LinkedSample> for Sample {
    fn from(link: LinkedSample) -> Self {
        Sample::Link(link)
    }
}

/// A decoded sample
#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    Array(SampleArray),
    Text(String),
    Json(Value),
}

impl SampleValue {
    pub fn as_array(&self) -> Option<&SampleArray> {
        match self {
            SampleValue::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn into_array(self) -> Result<SampleArray> {
        match self {
            SampleValue::Array(array) => Ok(array),
            SampleValue::Text(text) => Ok(SampleArray::from_text(&text)),
            SampleValue::Json(_) => Err(Error::SampleKind {
                expected: "array",
                actual: "json",
            }),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SampleValue::Text(text) => Some(text),
            _ => None,
        }
    }
}
