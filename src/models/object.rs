//! Represents an encrypted object held in the blob backend.

use super::policy::ExpirationPolicy;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Display name given to uploads that consist of inline text only.
pub const TEXT_SENTINEL: &str = "shared-text.txt";

/// Display name given to multi-item (archive) uploads.
pub const BUNDLE_SENTINEL: &str = "uploaded_files.zip";

pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// What an upload was built from. Only used to tag identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    Single,
    Bundle,
}

impl Origin {
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Origin::Single => "FILE-",
            Origin::Bundle => "ZIP-",
        }
    }
}

/// Index record for one stored object.
///
/// The record never changes after creation; the envelope bytes themselves
/// live in the blob backend under `backend_key`.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// Opaque identifier handed back to the uploader.
    pub id: String,

    /// Key of the encrypted envelope in the blob backend.
    pub backend_key: String,

    /// Name the client sees on download.
    pub display_name: String,

    /// MIME type recorded at upload.
    pub content_type: String,

    /// Expiration tier chosen at upload.
    pub policy: ExpirationPolicy,

    pub created_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,

    /// Whether a successful read deletes the object.
    pub is_short_lived: bool,
}

impl StoredObject {
    pub fn new(
        id: String,
        display_name: String,
        content_type: String,
        policy: ExpirationPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        let expires_at = now + policy.ttl();
        Self {
            backend_key: backend_key(&id, &display_name),
            id,
            display_name,
            content_type,
            policy,
            created_at: now,
            expires_at,
            is_short_lived: expires_at - now <= ExpirationPolicy::shortest_ttl(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Backend key for an object: `{id}/{sanitized display name}`.
pub fn backend_key(id: &str, display_name: &str) -> String {
    format!("{}/{}", id, sanitize_name(display_name))
}

/// Make a display name safe to use as a single backend key segment.
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.replace("..", "_");
    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if cleaned.is_empty() {
        "blob".to_string()
    } else {
        cleaned.to_string()
    }
}
