//! In-memory blob backend (tests and throwaway deployments).

use super::{BackendError, BackendResult, BlobBackend, Metadata};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MemoryBackend {
    blobs: RwLock<HashMap<String, (Bytes, Metadata)>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn contains(&self, key: &str) -> bool {
        self.blobs.read().contains_key(key)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Overwrite a stored blob in place, keeping its metadata.
    #[cfg(test)]
    pub fn tamper(&self, key: &str, f: impl FnOnce(&mut Vec<u8>)) {
        if let Some((data, _)) = self.blobs.write().get_mut(key) {
            let mut raw = data.to_vec();
            f(&mut raw);
            *data = Bytes::from(raw);
        }
    }

    #[cfg(test)]
    pub fn tamper_metadata(&self, key: &str, f: impl FnOnce(&mut Metadata)) {
        if let Some((_, meta)) = self.blobs.write().get_mut(key) {
            f(meta);
        }
    }
}

#[async_trait]
impl BlobBackend for MemoryBackend {
    async fn put(&self, key: &str, data: Bytes, metadata: Metadata) -> BackendResult<()> {
        self.blobs.write().insert(key.to_string(), (data, metadata));
        Ok(())
    }

    async fn get(&self, key: &str) -> BackendResult<Bytes> {
        self.blobs
            .read()
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| BackendError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> BackendResult<()> {
        self.blobs.write().remove(key);
        Ok(())
    }

    async fn head_metadata(&self, key: &str) -> BackendResult<Metadata> {
        self.blobs
            .read()
            .get(key)
            .map(|(_, meta)| meta.clone())
            .ok_or_else(|| BackendError::NotFound(key.to_string()))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
