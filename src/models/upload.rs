//! Upload shapes, classified once at the request boundary.

use crate::errors::{StoreError, StoreResult};
use bytes::Bytes;

/// One uploaded file part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadItem {
    /// Client-supplied filename. May be empty for blank form parts.
    pub name: String,

    /// Declared MIME type, if the client sent one.
    pub content_type: Option<String>,

    pub content: Bytes,
}

impl UploadItem {
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            content: content.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn is_named(&self) -> bool {
        !self.name.is_empty()
    }
}

/// What the client asked us to store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadRequest {
    /// Inline text and nothing else.
    TextOnly(String),
    /// Exactly one named file, stored as-is.
    SingleItem(UploadItem),
    /// Several files, or files plus text; stored as an archive.
    /// `items` only holds named items, in submission order.
    Bundle {
        text: Option<String>,
        items: Vec<UploadItem>,
    },
}

impl UploadRequest {
    /// Decide which upload case applies. Precedence: text-only, then single
    /// item, then bundle. An empty string counts as no text.
    pub fn classify(items: Vec<UploadItem>, text: Option<String>) -> StoreResult<Self> {
        let text = text.filter(|t| !t.is_empty());

        let only_blank_part = items.len() == 1 && !items[0].is_named();
        if let Some(text) = text.as_ref() {
            if items.is_empty() || only_blank_part {
                return Ok(UploadRequest::TextOnly(text.clone()));
            }
        }

        let mut named: Vec<UploadItem> = items.into_iter().filter(UploadItem::is_named).collect();
        if text.is_none() {
            match named.len() {
                0 => return Err(StoreError::EmptyUpload),
                1 => return Ok(UploadRequest::SingleItem(named.remove(0))),
                _ => {}
            }
        }

        Ok(UploadRequest::Bundle { text, items: named })
    }
}
