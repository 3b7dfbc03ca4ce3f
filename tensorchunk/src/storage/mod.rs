//! Key-value storage collaborators
//!
//! Chunks and metadata objects are opaque byte blobs addressed by string
//! keys. Providers hand out read-only views so sealed chunks can be shared
//! between readers without copying.

use std::ops::Deref;
use std::sync::Arc;

use crate::error::{Error, Result};

#[cfg(feature = "http")]
pub mod http;
pub mod local;
pub mod memory;

#[cfg(feature = "http")]
pub use http::HttpProvider;
pub use local::LocalProvider;
pub use memory::MemoryProvider;

/// Read-only view of a stored object
#[derive(Debug, Clone)]
pub enum StoredBytes {
    Shared(Arc<[u8]>),
    #[cfg(feature = "mmap")]
    Mapped(Arc<memmap2::Mmap>),
}

impl Deref for StoredBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            StoredBytes::Shared(bytes) => bytes,
            #[cfg(feature = "mmap")]
            StoredBytes::Mapped(map) => map,
        }
    }
}

impl AsRef<[u8]> for StoredBytes {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl From<Vec<u8>> for StoredBytes {
    fn from(bytes: Vec<u8>) -> Self {
        StoredBytes::Shared(bytes.into())
    }
}

/// Blob storage addressed by key
pub trait StorageProvider: Send + Sync + std::fmt::Debug {
    /// Fetch an object; missing keys are `Error::KeyNotFound`
    fn get(&self, key: &str) -> Result<StoredBytes>;

    /// Store an object, replacing any previous value
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove an object
    fn delete(&self, key: &str) -> Result<()>;

    fn exists(&self, key: &str) -> Result<bool> {
        match self.get(key) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Writes fail with `Error::ReadOnly`
    fn is_read_only(&self) -> bool {
        false
    }

    /// URL a media decoder can fetch the object from
    fn presigned_url(&self, key: &str) -> Result<String> {
        let _ = key;
        Err(Error::NotImplemented("presigned urls for this provider"))
    }
}

pub(crate) fn check_writable(read_only: bool, key: &str) -> Result<()> {
    if read_only {
        return Err(Error::ReadOnly(key.to_string()));
    }
    Ok(())
}
