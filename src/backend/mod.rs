//! Blob backend abstraction (local filesystem / memory).
//!
//! The store only ever talks to a backend through [`BlobBackend`]: four
//! key-addressed operations plus a small string metadata map stored next to
//! each blob.

pub mod local;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use std::{collections::BTreeMap, io};
use thiserror::Error;

pub use local::LocalBackend;
pub use memory::MemoryBackend;

/// Side metadata stored alongside a blob.
pub type Metadata = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("blob `{0}` not found")]
    NotFound(String),
    #[error("invalid blob key `{0}`")]
    InvalidKey(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("metadata encoding: {0}")]
    Metadata(#[from] serde_json::Error),
}

pub type BackendResult<T> = Result<T, BackendError>;

#[async_trait]
pub trait BlobBackend: Send + Sync + 'static {
    /// Store `data` under `key`, replacing anything already there.
    async fn put(&self, key: &str, data: Bytes, metadata: Metadata) -> BackendResult<()>;

    /// Fetch the blob stored under `key`.
    async fn get(&self, key: &str) -> BackendResult<Bytes>;

    /// Remove the blob under `key`. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> BackendResult<()>;

    /// Fetch only the side metadata stored under `key`.
    async fn head_metadata(&self, key: &str) -> BackendResult<Metadata>;

    /// Short name used in logs and readiness output.
    fn name(&self) -> &'static str;
}
