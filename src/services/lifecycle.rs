//! Read-side lifecycle: what a successful read returns, and the background
//! task that reaps expired objects nobody asked for.

use crate::{
    errors::{StoreError, StoreResult},
    models::object::{BUNDLE_SENTINEL, StoredObject, TEXT_SENTINEL},
    services::{bundle, share_service::ShareService},
};
use bytes::Bytes;
use chrono::Utc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// What a download hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Download {
    /// Inline-text upload, returned as a preview.
    Text { filename: String, content: String },
    /// Archive whose only member is the inline text, returned as a preview.
    BundleText { filename: String, content: String },
    /// Anything else, returned as a downloadable file.
    Attachment {
        filename: String,
        content_type: String,
        content: Bytes,
    },
}

/// Choose the response shape for decrypted `plaintext` of `object`.
pub fn shape(object: &StoredObject, plaintext: Vec<u8>) -> StoreResult<Download> {
    match object.display_name.as_str() {
        TEXT_SENTINEL => {
            let content = String::from_utf8(plaintext).map_err(|_| {
                StoreError::CorruptData(format!("{} is not valid UTF-8", object.id))
            })?;
            Ok(Download::Text {
                filename: object.display_name.clone(),
                content,
            })
        }
        BUNDLE_SENTINEL => match bundle::sole_text_member(&plaintext)? {
            Some(content) => Ok(Download::BundleText {
                filename: TEXT_SENTINEL.to_string(),
                content,
            }),
            None => Ok(attachment(object, plaintext)),
        },
        _ => Ok(attachment(object, plaintext)),
    }
}

fn attachment(object: &StoredObject, plaintext: Vec<u8>) -> Download {
    Download::Attachment {
        filename: object.display_name.clone(),
        content_type: object.content_type.clone(),
        content: Bytes::from(plaintext),
    }
}

/// Spawn a background task that periodically purges expired objects.
///
/// Purged ids keep answering "expired" (see [`ShareService::sweep`]), so the
/// sweeper never changes what a client observes.
pub fn spawn_sweeper(service: ShareService, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = service.sweep(Utc::now()).await;
            if purged > 0 {
                tracing::info!("Expiry sweep: purged {} expired objects", purged);
            } else {
                tracing::debug!("Expiry sweep: nothing expired");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            object::{ARCHIVE_CONTENT_TYPE, TEXT_CONTENT_TYPE},
            policy::ExpirationPolicy,
            upload::{UploadItem, UploadRequest},
        },
        services::bundle::assemble,
    };

    fn object(display_name: &str, content_type: &str) -> StoredObject {
        StoredObject::new(
            "FILE-ABC123".into(),
            display_name.into(),
            content_type.into(),
            ExpirationPolicy::Store1Hour,
            Utc::now(),
        )
    }

    #[test]
    fn test_text_preview() {
        let out = shape(&object(TEXT_SENTINEL, TEXT_CONTENT_TYPE), b"hello".to_vec()).unwrap();
        assert_eq!(
            out,
            Download::Text {
                filename: TEXT_SENTINEL.into(),
                content: "hello".into()
            }
        );
    }

    #[test]
    fn test_text_preview_rejects_invalid_utf8() {
        assert!(matches!(
            shape(&object(TEXT_SENTINEL, TEXT_CONTENT_TYPE), vec![0xff, 0xfe]),
            Err(StoreError::CorruptData(_))
        ));
    }

    #[test]
    fn test_bundle_with_only_text_is_previewed() {
        let payload = assemble(UploadRequest::Bundle {
            text: Some("note".into()),
            items: vec![],
        })
        .unwrap()
        .payload;
        let out = shape(&object(BUNDLE_SENTINEL, ARCHIVE_CONTENT_TYPE), payload.to_vec()).unwrap();
        assert_eq!(
            out,
            Download::BundleText {
                filename: TEXT_SENTINEL.into(),
                content: "note".into()
            }
        );
    }

    #[test]
    fn test_bundle_with_files_is_attachment() {
        let payload = assemble(
            UploadRequest::classify(vec![UploadItem::new("a.txt", "x")], Some("note".into()))
                .unwrap(),
        )
        .unwrap()
        .payload;
        let out = shape(&object(BUNDLE_SENTINEL, ARCHIVE_CONTENT_TYPE), payload.to_vec()).unwrap();
        assert_eq!(
            out,
            Download::Attachment {
                filename: BUNDLE_SENTINEL.into(),
                content_type: ARCHIVE_CONTENT_TYPE.into(),
                content: payload,
            }
        );
    }

    #[test]
    fn test_plain_file_is_attachment() {
        let out = shape(&object("photo.jpg", "image/jpeg"), vec![1, 2, 3]).unwrap();
        assert_eq!(
            out,
            Download::Attachment {
                filename: "photo.jpg".into(),
                content_type: "image/jpeg".into(),
                content: Bytes::from(vec![1, 2, 3]),
            }
        );
    }
}
