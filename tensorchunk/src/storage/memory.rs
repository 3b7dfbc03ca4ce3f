//! In-memory provider
//!
//! Used for worker-private metadata during transforms and in tests.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

use super::{check_writable, StorageProvider, StoredBytes};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub struct MemoryProvider {
    objects: RwLock<HashMap<String, Arc<[u8]>>>,
    read_only: bool,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of this provider's contents that rejects writes
    pub fn read_only_snapshot(&self) -> Self {
        Self {
            objects: RwLock::new(self.objects.read().clone()),
            read_only: true,
        }
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Sorted keys starting with `prefix`
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

impl StorageProvider for MemoryProvider {
    fn get(&self, key: &str) -> Result<StoredBytes> {
        self.objects
            .read()
            .get(key)
            .map(|bytes| StoredBytes::Shared(Arc::clone(bytes)))
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        check_writable(self.read_only, key)?;
        self.objects.write().insert(key.to_string(), value.into());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        check_writable(self.read_only, key)?;
        self.objects
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.read().contains_key(key))
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn presigned_url(&self, key: &str) -> Result<String> {
        Ok(format!("memory://{key}"))
    }
}
