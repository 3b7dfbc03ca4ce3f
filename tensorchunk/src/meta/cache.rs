//! Commit-scoped load-or-create cache for metadata objects
//!
//! Each cache owns one object of a tensor. The object is loaded from the
//! metadata storage on first use for a commit, or created empty and
//! persisted when the key does not exist yet. Switching commits reloads it.

use parking_lot::RwLock;
use tracing::debug;

use super::MetaObject;
use crate::error::{Error, Result};
use crate::keys::meta_key;
use crate::storage::StorageProvider;

/// How a cached object came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Read from storage, or already cached for this commit
    Loaded,
    /// Absent from storage and created empty
    CreatedNew,
}

#[derive(Debug)]
struct Slot<T> {
    commit_id: String,
    value: T,
    dirty: bool,
}

#[derive(Debug)]
pub struct MetaCache<T: MetaObject> {
    tensor_key: String,
    slot: RwLock<Option<Slot<T>>>,
}

impl<T: MetaObject> MetaCache<T> {
    pub fn new(tensor_key: &str) -> Self {
        Self {
            tensor_key: tensor_key.to_string(),
            slot: RwLock::new(None),
        }
    }

    pub fn key(&self, commit_id: &str) -> String {
        meta_key(&self.tensor_key, commit_id, T::ARTIFACT)
    }

    /// Whether the object is cached for `commit_id` or present in storage
    pub fn exists(&self, storage: &dyn StorageProvider, commit_id: &str) -> Result<bool> {
        if let Some(slot) = self.slot.read().as_ref() {
            if slot.commit_id == commit_id {
                return Ok(true);
            }
        }
        storage.exists(&self.key(commit_id))
    }

    fn load(&self, storage: &dyn StorageProvider, commit_id: &str) -> Result<(Slot<T>, LoadOutcome)> {
        let key = self.key(commit_id);
        match storage.get(&key) {
            Ok(bytes) => {
                let value = T::from_bytes(&bytes)?;
                let slot = Slot {
                    commit_id: commit_id.to_string(),
                    value,
                    dirty: false,
                };
                Ok((slot, LoadOutcome::Loaded))
            }
            Err(e) if e.is_not_found() => {
                let value = T::default();
                if storage.is_read_only() {
                    debug!(key, "read-only storage, keeping new object in memory");
                } else {
                    storage.put(&key, &value.to_bytes()?)?;
                }
                let slot = Slot {
                    commit_id: commit_id.to_string(),
                    value,
                    dirty: false,
                };
                Ok((slot, LoadOutcome::CreatedNew))
            }
            Err(e) => Err(e),
        }
    }

    fn fill<'a>(
        &self,
        slot: &'a mut Option<Slot<T>>,
        storage: &dyn StorageProvider,
        commit_id: &str,
    ) -> Result<(&'a mut Slot<T>, LoadOutcome)> {
        let fresh = match slot {
            Some(current) if current.commit_id == commit_id => None,
            _ => Some(self.load(storage, commit_id)?),
        };
        let outcome = match fresh {
            Some((loaded, outcome)) => {
                *slot = Some(loaded);
                outcome
            }
            None => LoadOutcome::Loaded,
        };
        let slot = slot
            .as_mut()
            .ok_or_else(|| Error::Storage(format!("metadata slot for {} is empty", self.tensor_key)))?;
        Ok((slot, outcome))
    }

    /// Make sure the object for `commit_id` is cached
    pub fn load_or_create(&self, storage: &dyn StorageProvider, commit_id: &str) -> Result<LoadOutcome> {
        let mut slot = self.slot.write();
        let (_, outcome) = self.fill(&mut slot, storage, commit_id)?;
        Ok(outcome)
    }

    /// Run `f` against the object for `commit_id`
    pub fn read<R>(
        &self,
        storage: &dyn StorageProvider,
        commit_id: &str,
        f: impl FnOnce(&T) -> R,
    ) -> Result<R> {
        {
            let slot = self.slot.read();
            if let Some(slot) = slot.as_ref() {
                if slot.commit_id == commit_id {
                    return Ok(f(&slot.value));
                }
            }
        }
        let mut slot = self.slot.write();
        let (slot, _) = self.fill(&mut slot, storage, commit_id)?;
        Ok(f(&slot.value))
    }

    /// Run `f` against the object and mark it for the next flush
    pub fn write<R>(
        &self,
        storage: &dyn StorageProvider,
        commit_id: &str,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R> {
        let mut slot = self.slot.write();
        let (slot, _) = self.fill(&mut slot, storage, commit_id)?;
        slot.dirty = true;
        Ok(f(&mut slot.value))
    }

    /// Clone of the object for `commit_id`
    pub fn get(&self, storage: &dyn StorageProvider, commit_id: &str) -> Result<T> {
        self.read(storage, commit_id, T::clone)
    }

    /// Replace the object outright
    pub fn replace(&self, commit_id: &str, value: T) {
        *self.slot.write() = Some(Slot {
            commit_id: commit_id.to_string(),
            value,
            dirty: true,
        });
    }

    /// Persist the object if it changed since the last flush
    pub fn flush(&self, storage: &dyn StorageProvider) -> Result<()> {
        let mut slot = self.slot.write();
        let Some(slot) = slot.as_mut() else {
            return Ok(());
        };
        if !slot.dirty {
            return Ok(());
        }
        let key = self.key(&slot.commit_id);
        if storage.is_read_only() {
            debug!(key, "read-only storage, skipping metadata flush");
        } else {
            storage.put(&key, &slot.value.to_bytes()?)?;
        }
        slot.dirty = false;
        Ok(())
    }

    /// Drop the cached object
    pub fn invalidate(&self) {
        *self.slot.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::FIRST_COMMIT_ID;
    use crate::storage::MemoryProvider;
    use tensorchunk_core::CredsEncoder;

    #[test]
    fn test_create_then_load() {
        let storage = MemoryProvider::new();
        let cache: MetaCache<CredsEncoder> = MetaCache::new("links");

        assert!(!cache.exists(&storage, FIRST_COMMIT_ID).unwrap());
        assert_eq!(
            cache.load_or_create(&storage, FIRST_COMMIT_ID).unwrap(),
            LoadOutcome::CreatedNew
        );
        assert!(storage.exists("links/creds_index/creds").unwrap());

        cache.write(&storage, FIRST_COMMIT_ID, |enc| enc.register_samples(1, 3)).unwrap();
        cache.flush(&storage).unwrap();

        let fresh: MetaCache<CredsEncoder> = MetaCache::new("links");
        assert_eq!(fresh.load_or_create(&storage, FIRST_COMMIT_ID).unwrap(), LoadOutcome::Loaded);
        assert_eq!(fresh.read(&storage, FIRST_COMMIT_ID, |enc| enc.num_samples()).unwrap(), 3);
    }

    #[test]
    fn test_commit_change_reloads() {
        let storage = MemoryProvider::new();
        let cache: MetaCache<CredsEncoder> = MetaCache::new("links");
        cache.write(&storage, FIRST_COMMIT_ID, |enc| enc.register_samples(0, 2)).unwrap();
        cache.flush(&storage).unwrap();

        assert_eq!(cache.load_or_create(&storage, "other").unwrap(), LoadOutcome::CreatedNew);
        assert!(storage.exists("versions/other/links/creds_index/creds").unwrap());
        assert_eq!(cache.read(&storage, "other", |enc| enc.num_samples()).unwrap(), 0);
        assert_eq!(cache.read(&storage, FIRST_COMMIT_ID, |enc| enc.num_samples()).unwrap(), 2);
    }

    #[test]
    fn test_read_only_creation_degrades() {
        let storage = MemoryProvider::new().read_only_snapshot();
        let cache: MetaCache<CredsEncoder> = MetaCache::new("links");
        assert_eq!(
            cache.load_or_create(&storage, FIRST_COMMIT_ID).unwrap(),
            LoadOutcome::CreatedNew
        );
        assert!(storage.is_empty());
        cache.write(&storage, FIRST_COMMIT_ID, |enc| enc.register_samples(2, 1)).unwrap();
        cache.flush(&storage).unwrap();
        assert_eq!(cache.read(&storage, FIRST_COMMIT_ID, |enc| enc.num_samples()).unwrap(), 1);
    }
}
