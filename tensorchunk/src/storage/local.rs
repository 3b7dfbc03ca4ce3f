//! Filesystem provider
//!
//! Keys map to paths below a root directory. Reads are memory-mapped when
//! the `mmap` feature is enabled.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[cfg(feature = "mmap")]
use memmap2::MmapOptions;
use tracing::debug;

use super::{check_writable, StorageProvider, StoredBytes};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct LocalProvider {
    root: PathBuf,
    read_only: bool,
}

impl LocalProvider {
    /// Open a writable provider rooted at `root`, creating it if needed
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
            read_only: false,
        })
    }

    /// Open an existing directory without write access
    pub fn open_read_only<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(Error::KeyNotFound(root.display().to_string()));
        }
        Ok(Self {
            root,
            read_only: true,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, key: &str) -> PathBuf {
        self.root.join(key.trim_start_matches('/'))
    }

    /// Read a file at an absolute or relative path
    pub fn read_path(path: &Path) -> Result<StoredBytes> {
        let file = File::open(path).map_err(|e| not_found_or_io(e, &path.display().to_string()))?;
        map_file(&file)
    }
}

fn not_found_or_io(err: io::Error, key: &str) -> Error {
    if err.kind() == io::ErrorKind::NotFound {
        Error::KeyNotFound(key.to_string())
    } else {
        Error::Io(err)
    }
}

#[cfg(feature = "mmap")]
fn map_file(file: &File) -> Result<StoredBytes> {
    if file.metadata()?.len() == 0 {
        return Ok(StoredBytes::from(Vec::new()));
    }
    // SAFETY: Read-only mapping; chunks are sealed before they are read
    let mmap = unsafe { MmapOptions::new().map(file)? };
    Ok(StoredBytes::Mapped(mmap.into()))
}

#[cfg(not(feature = "mmap"))]
fn map_file(mut file: &File) -> Result<StoredBytes> {
    use std::io::Read;

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(StoredBytes::from(bytes))
}

impl StorageProvider for LocalProvider {
    fn get(&self, key: &str) -> Result<StoredBytes> {
        let file = File::open(self.path_of(key)).map_err(|e| not_found_or_io(e, key))?;
        map_file(&file)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        check_writable(self.read_only, key)?;
        let path = self.path_of(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write beside the target and rename so readers never map a partial file
        let tmp = path.with_extension("tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(value)?;
        file.sync_data()?;
        fs::rename(&tmp, &path)?;
        debug!(key, bytes = value.len(), "wrote object");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        check_writable(self.read_only, key)?;
        fs::remove_file(self.path_of(key)).map_err(|e| not_found_or_io(e, key))
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.path_of(key).is_file())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn presigned_url(&self, key: &str) -> Result<String> {
        Ok(format!("file://{}", self.path_of(key).display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip_on_disk() {
        let dir = TempDir::new().unwrap();
        let storage = LocalProvider::new(dir.path()).unwrap();
        storage.put("t/chunks/ab", b"chunk bytes").unwrap();
        assert_eq!(&*storage.get("t/chunks/ab").unwrap(), b"chunk bytes");
        assert!(storage.exists("t/chunks/ab").unwrap());
        assert!(dir.path().join("t/chunks/ab").is_file());

        storage.put("t/empty", b"").unwrap();
        assert!(storage.get("t/empty").unwrap().is_empty());

        storage.delete("t/chunks/ab").unwrap();
        assert!(storage.get("t/chunks/ab").unwrap_err().is_not_found());
    }

    #[test]
    fn test_read_only() {
        let dir = TempDir::new().unwrap();
        LocalProvider::new(dir.path()).unwrap().put("k", b"v").unwrap();

        let storage = LocalProvider::open_read_only(dir.path()).unwrap();
        assert_eq!(&*storage.get("k").unwrap(), b"v");
        assert!(matches!(storage.put("k", b"w"), Err(Error::ReadOnly(_))));
        assert!(LocalProvider::open_read_only(dir.path().join("missing")).is_err());
    }
}
