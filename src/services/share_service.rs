//! ShareService: upload and download orchestration.
//!
//! Upload: classify → assemble → seal → backend put → publish in the index.
//! Download: claim in the index → backend get → open → shape → optional
//! delete-after-read. The index lock is never held across backend or crypto
//! calls; [`ObjectIndex::claim`] makes the expiry and delete-after-read
//! decisions atomically so only one reader ever deletes a given object.

use crate::{
    backend::{BackendError, BlobBackend, Metadata},
    errors::{StoreError, StoreResult},
    models::{
        object::{Origin, StoredObject},
        policy::ExpirationPolicy,
        upload::UploadRequest,
    },
    services::{
        bundle,
        envelope::{Envelope, SecretKey},
        lifecycle::{self, Download},
        object_index::{Claim, ObjectIndex},
    },
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the uploader gets back.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub file_id: String,
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ShareService {
    backend: Arc<dyn BlobBackend>,
    index: ObjectIndex,
    key: Arc<SecretKey>,
}

impl ShareService {
    pub fn new(backend: Arc<dyn BlobBackend>, key: SecretKey) -> Self {
        Self {
            backend,
            index: ObjectIndex::new(),
            key: Arc::new(key),
        }
    }

    pub fn index(&self) -> &ObjectIndex {
        &self.index
    }

    pub fn backend(&self) -> &Arc<dyn BlobBackend> {
        &self.backend
    }

    pub async fn upload(
        &self,
        request: UploadRequest,
        policy: ExpirationPolicy,
    ) -> StoreResult<UploadReceipt> {
        self.upload_at(request, policy, Utc::now()).await
    }

    pub(crate) async fn upload_at(
        &self,
        request: UploadRequest,
        policy: ExpirationPolicy,
        now: DateTime<Utc>,
    ) -> StoreResult<UploadReceipt> {
        let assembled = bundle::assemble(request)?;
        let id = self.index.reserve(assembled.origin)?;
        let object = StoredObject::new(
            id.clone(),
            assembled.display_name,
            assembled.content_type,
            policy,
            now,
        );

        if let Err(err) = self.seal_and_store(&object, assembled.payload).await {
            self.index.remove(&id);
            return Err(err);
        }
        let object = self.index.create(object);

        info!(
            id = %object.id,
            key = %object.backend_key,
            policy = %policy,
            "stored object until {}",
            object.expires_at
        );

        let message = match assembled.origin {
            Origin::Bundle => "ZIP file uploaded successfully!",
            Origin::Single => "File uploaded successfully!",
        };
        Ok(UploadReceipt {
            file_id: object.id.clone(),
            message: message.to_string(),
            expires_at: object.expires_at,
        })
    }

    async fn seal_and_store(&self, object: &StoredObject, payload: Bytes) -> StoreResult<()> {
        let key = self.key.clone();
        let envelope = tokio::task::spawn_blocking(move || Envelope::seal(&payload, &key))
            .await
            .map_err(|e| StoreError::Crypto(format!("seal task failed: {e}")))??;

        let mut metadata = Metadata::new();
        metadata.insert("expiration".into(), object.policy.ttl_seconds().to_string());
        metadata.insert("original_filename".into(), object.display_name.clone());
        metadata.insert("content_type".into(), object.content_type.clone());
        envelope.write_hints(&mut metadata);

        self.backend
            .put(
                &object.backend_key,
                Bytes::from(envelope.to_bytes()),
                metadata,
            )
            .await?;
        Ok(())
    }

    pub async fn download(&self, id: &str) -> StoreResult<Download> {
        self.download_at(id, Utc::now()).await
    }

    pub(crate) async fn download_at(&self, id: &str, now: DateTime<Utc>) -> StoreResult<Download> {
        let (object, exclusive) = match self.index.claim(id, now)? {
            Claim::Expired(object) => {
                debug!(id, "download of expired object");
                if let Some(object) = object {
                    self.purge(&object).await;
                }
                return Err(StoreError::Expired(id.to_string()));
            }
            Claim::Shared(object) => (object, false),
            Claim::Exclusive(object) => (object, true),
        };

        let result = self.read(&object).await;
        if !exclusive {
            return result;
        }

        match result {
            Ok(download) => {
                self.index.remove(id);
                self.purge(&object).await;
                info!(id, "served delete-after-read object");
                Ok(download)
            }
            Err(err) => {
                self.index.release(id);
                Err(err)
            }
        }
    }

    async fn read(&self, object: &StoredObject) -> StoreResult<Download> {
        let raw = self
            .backend
            .get(&object.backend_key)
            .await
            .map_err(|err| self.dangling(object, err))?;
        let metadata = self
            .backend
            .head_metadata(&object.backend_key)
            .await
            .map_err(|err| self.dangling(object, err))?;

        let envelope = Envelope::from_bytes(&raw)?;
        envelope.verify_hints(&metadata)?;

        let key = self.key.clone();
        let plaintext = tokio::task::spawn_blocking(move || envelope.open(&key))
            .await
            .map_err(|e| StoreError::Crypto(format!("open task failed: {e}")))??;

        lifecycle::shape(object, plaintext)
    }

    /// An index entry whose backend object is gone can never be served again;
    /// drop it unless the sweeper already replaced it with a tombstone. Every
    /// other backend failure leaves the index untouched.
    fn dangling(&self, object: &StoredObject, err: BackendError) -> StoreError {
        match err {
            BackendError::NotFound(_) => {
                if self.index.remove_live(&object.id, object) {
                    warn!(id = %object.id, "backend object missing, dropped index entry");
                }
                StoreError::NotFound(object.id.clone())
            }
            other => StoreError::BackendUnavailable(other),
        }
    }

    /// Best-effort backend delete; failures are logged, never surfaced.
    async fn purge(&self, object: &StoredObject) {
        match self.backend.delete(&object.backend_key).await {
            Ok(()) => debug!(id = %object.id, key = %object.backend_key, "deleted backend object"),
            Err(err) => warn!(
                id = %object.id,
                key = %object.backend_key,
                "failed to delete backend object: {}",
                err
            ),
        }
    }

    /// Reap every expired, unclaimed object. Returns how many were purged.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let reaped = self.index.reap_expired(now);
        for object in &reaped {
            self.purge(object).await;
        }
        reaped.len()
    }
}
