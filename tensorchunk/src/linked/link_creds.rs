//! Credentials for linked samples
//!
//! Each linked sample may name a credentials key. Keys are registered in
//! order and a key is encoded as its position plus one, leaving `0` for
//! samples without credentials. Storage handles for remote objects are built
//! by a [`ProviderFactory`] and cached per key and provider family.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;
use tensorchunk_core::NO_CREDS;
use tracing::debug;

use crate::error::{Error, Result};
use crate::storage::StorageProvider;

/// Credential values, e.g. access key id and secret
pub type Creds = HashMap<String, String>;

/// Where a linked path lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderFamily {
    S3,
    Gcs,
    Http,
    Local,
}

impl ProviderFamily {
    /// Family of a linked path, from its scheme
    pub fn of(path: &str) -> Self {
        match path.split_once("://").map(|(scheme, _)| scheme) {
            Some("s3") => ProviderFamily::S3,
            Some("gcs" | "gcp" | "gs") => ProviderFamily::Gcs,
            Some("http" | "https") => ProviderFamily::Http,
            _ => ProviderFamily::Local,
        }
    }

    /// Key to request from this family's provider
    ///
    /// Bucket-style families drop the scheme, HTTP keeps the full URL and
    /// local paths drop an optional `file://` prefix.
    pub fn object_key(self, path: &str) -> &str {
        match self {
            ProviderFamily::S3 | ProviderFamily::Gcs => {
                path.split_once("://").map(|(_, rest)| rest).unwrap_or(path)
            }
            ProviderFamily::Http => path,
            ProviderFamily::Local => path.strip_prefix("file://").unwrap_or(path),
        }
    }

    pub fn is_remote(self) -> bool {
        !matches!(self, ProviderFamily::Local)
    }
}

/// Builds storage handles for remote families
pub trait ProviderFactory: Send + Sync + std::fmt::Debug {
    fn create(&self, family: ProviderFamily, creds: &Creds) -> Result<Arc<dyn StorageProvider>>;
}

type ProviderCache = HashMap<(Option<String>, ProviderFamily), Arc<dyn StorageProvider>>;

/// Registry of credential keys shared by the linked tensors of a dataset
#[derive(Debug, Default)]
pub struct LinkCreds {
    keys: Vec<String>,
    creds: HashMap<String, Creds>,
    factory: Option<Arc<dyn ProviderFactory>>,
    providers: RwLock<ProviderCache>,
}

impl LinkCreds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_factory(factory: Arc<dyn ProviderFactory>) -> Self {
        Self {
            factory: Some(factory),
            ..Self::default()
        }
    }

    /// Register a key; returns `false` if it was already known
    pub fn add_creds_key(&mut self, key: &str) -> bool {
        if self.keys.iter().any(|k| k == key) {
            return false;
        }
        self.keys.push(key.to_string());
        true
    }

    /// Set the credential values of a registered key
    pub fn populate_creds(&mut self, key: &str, creds: Creds) -> Result<()> {
        if !self.keys.iter().any(|k| k == key) {
            return Err(Error::UnknownCreds(key.to_string()));
        }
        self.creds.insert(key.to_string(), creds);
        self.providers.write().retain(|(cached, _), _| cached.as_deref() != Some(key));
        Ok(())
    }

    pub fn creds_keys(&self) -> &[String] {
        &self.keys
    }

    /// Encoded form of an optional key
    pub fn get_encoding(&self, key: Option<&str>) -> Result<u32> {
        let Some(key) = key else {
            return Ok(NO_CREDS);
        };
        self.keys
            .iter()
            .position(|k| k == key)
            .map(|pos| pos as u32 + 1)
            .ok_or_else(|| Error::UnknownCreds(key.to_string()))
    }

    /// Key behind an encoded value; `None` for samples without credentials
    pub fn get_creds_key(&self, encoded: u32) -> Result<Option<&str>> {
        if encoded == NO_CREDS {
            return Ok(None);
        }
        self.keys
            .get(encoded as usize - 1)
            .map(|k| Some(k.as_str()))
            .ok_or_else(|| Error::UnknownCreds(format!("#{encoded}")))
    }

    /// Credential values behind an encoded value
    pub fn resolve(&self, encoded: u32) -> Result<Option<&Creds>> {
        Ok(self.get_creds_key(encoded)?.and_then(|key| self.creds.get(key)))
    }

    /// Storage handle for `family` scoped to the credentials of `key`
    pub fn storage_provider_for(
        &self,
        key: Option<&str>,
        family: ProviderFamily,
    ) -> Result<Arc<dyn StorageProvider>> {
        let cache_key = (key.map(str::to_string), family);
        if let Some(provider) = self.providers.read().get(&cache_key) {
            return Ok(Arc::clone(provider));
        }

        let provider = self.create_provider(key, family)?;
        debug!(key, ?family, "created linked storage provider");
        self.providers.write().insert(cache_key, Arc::clone(&provider));
        Ok(provider)
    }

    fn create_provider(&self, key: Option<&str>, family: ProviderFamily) -> Result<Arc<dyn StorageProvider>> {
        if family == ProviderFamily::Http {
            return http_provider();
        }
        let empty = Creds::new();
        let creds = match key {
            Some(key) => {
                self.get_encoding(Some(key))?;
                self.creds.get(key).unwrap_or(&empty)
            }
            None => &empty,
        };
        match &self.factory {
            Some(factory) => factory.create(family, creds),
            None => Err(Error::Config(format!("no provider factory for {family:?} links"))),
        }
    }
}

#[cfg(feature = "http")]
fn http_provider() -> Result<Arc<dyn StorageProvider>> {
    Ok(Arc::new(crate::storage::HttpProvider::new("")?))
}

#[cfg(not(feature = "http"))]
fn http_provider() -> Result<Arc<dyn StorageProvider>> {
    Err(Error::NotImplemented("http links need the `http` feature"))
}
