//! Read-only HTTP provider
//!
//! Keys are resolved against a base URL. Requests run on a private
//! current-thread runtime so the provider stays synchronous; fetched objects
//! are cached since chunks never change once sealed.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;
use reqwest::Client;
use tracing::debug;

use super::{StorageProvider, StoredBytes};
use crate::error::{Error, Result};

#[derive(Debug)]
pub struct HttpProvider {
    client: Client,
    base_url: String,
    runtime: tokio::runtime::Runtime,
    cache: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl HttpProvider {
    pub fn new(base_url: &str) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            runtime,
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn url_of(&self, key: &str) -> String {
        if key.starts_with("http://") || key.starts_with("https://") {
            key.to_string()
        } else {
            format!("{}/{}", self.base_url, key.trim_start_matches('/'))
        }
    }

    async fn fetch(client: &Client, url: &str) -> Result<Vec<u8>> {
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::KeyNotFound(url.to_string()));
        }
        if !response.status().is_success() {
            return Err(Error::Storage(format!("GET {url} returned {}", response.status())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

impl StorageProvider for HttpProvider {
    fn get(&self, key: &str) -> Result<StoredBytes> {
        if let Some(bytes) = self.cache.read().get(key) {
            return Ok(StoredBytes::Shared(Arc::clone(bytes)));
        }

        let url = self.url_of(key);
        let data: Arc<[u8]> = self.runtime.block_on(Self::fetch(&self.client, &url))?.into();
        debug!(url, bytes = data.len(), "fetched object");

        self.cache.write().insert(key.to_string(), Arc::clone(&data));
        Ok(StoredBytes::Shared(data))
    }

    fn put(&self, key: &str, _value: &[u8]) -> Result<()> {
        Err(Error::ReadOnly(self.url_of(key)))
    }

    fn delete(&self, key: &str) -> Result<()> {
        Err(Error::ReadOnly(self.url_of(key)))
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn presigned_url(&self, key: &str) -> Result<String> {
        Ok(self.url_of(key))
    }
}
