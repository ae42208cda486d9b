//! Local-disk blob backend.
//!
//! Payloads live under `base_path/{shard}/{shard}/{key}`, with the side
//! metadata as JSON in `{key}.meta.json` next to them. Shards come from the
//! MD5 of the key so no single directory grows without bound.

use super::{BackendError, BackendResult, BlobBackend, Metadata};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

const MAX_KEY_LEN: usize = 1024;
const METADATA_SUFFIX: &str = ".meta.json";

#[derive(Debug, Clone)]
pub struct LocalBackend {
    /// Base directory on disk where blobs are stored.
    base_path: PathBuf,
}

impl LocalBackend {
    /// Create a backend rooted at `base_path`, creating the directory if needed.
    pub async fn new(base_path: impl Into<PathBuf>) -> BackendResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;
        Ok(Self { base_path })
    }

    /// Reject keys that could escape `base_path`.
    fn ensure_key_safe(key: &str) -> BackendResult<()> {
        let invalid = key.is_empty()
            || key.len() > MAX_KEY_LEN
            || key.starts_with('/')
            || key.contains("..")
            || key.ends_with('/')
            || key
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
        if invalid {
            return Err(BackendError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    /// First two bytes of MD5(key) as lowercase hex.
    fn shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    fn metadata_path(blob_path: &Path) -> PathBuf {
        let mut raw = blob_path.as_os_str().to_owned();
        raw.push(METADATA_SUFFIX);
        PathBuf::from(raw)
    }

    /// Write `data` to a temp file beside `path`, fsync, then rename into place.
    async fn write_atomic(path: &Path, data: &[u8]) -> BackendResult<()> {
        let parent = path.parent().ok_or_else(|| {
            BackendError::Io(io::Error::new(
                ErrorKind::Other,
                "blob path missing parent directory",
            ))
        })?;
        fs::create_dir_all(parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let result = async {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(data).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, path).await
        }
        .await;

        if let Err(err) = result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BackendError::Io(err));
        }
        Ok(())
    }

    async fn remove_if_present(path: &Path) -> BackendResult<()> {
        match fs::remove_file(path).await {
            Ok(_) => {
                debug!("removed {}", path.display());
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(BackendError::Io(err)),
        }
    }

    /// Remove empty directories from `start` up to (not including) `base_path`.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.base_path) && current != self.base_path {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

fn not_found_as(key: &str) -> impl FnOnce(io::Error) -> BackendError + '_ {
    move |err| {
        if err.kind() == ErrorKind::NotFound {
            BackendError::NotFound(key.to_string())
        } else {
            BackendError::Io(err)
        }
    }
}

#[async_trait]
impl BlobBackend for LocalBackend {
    async fn put(&self, key: &str, data: Bytes, metadata: Metadata) -> BackendResult<()> {
        Self::ensure_key_safe(key)?;
        let path = self.blob_path(key);
        let encoded = serde_json::to_vec(&metadata)?;

        // Metadata first: a payload is never visible without its metadata.
        Self::write_atomic(&Self::metadata_path(&path), &encoded).await?;
        Self::write_atomic(&path, &data).await
    }

    async fn get(&self, key: &str) -> BackendResult<Bytes> {
        Self::ensure_key_safe(key)?;
        let data = fs::read(self.blob_path(key)).await.map_err(not_found_as(key))?;
        Ok(Bytes::from(data))
    }

    async fn delete(&self, key: &str) -> BackendResult<()> {
        Self::ensure_key_safe(key)?;
        let path = self.blob_path(key);
        Self::remove_if_present(&path).await?;
        Self::remove_if_present(&Self::metadata_path(&path)).await?;

        if let Some(parent) = path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }

    async fn head_metadata(&self, key: &str) -> BackendResult<Metadata> {
        Self::ensure_key_safe(key)?;
        let path = Self::metadata_path(&self.blob_path(key));
        let raw = fs::read(&path).await.map_err(not_found_as(key))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
