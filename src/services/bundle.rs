//! Turns a classified upload into the single payload that gets sealed.
//!
//! Text-only and single-item uploads are stored as their raw bytes; anything
//! else becomes a zip archive whose members keep their exact names and bytes,
//! text first, then items in submission order.

use crate::{
    errors::{StoreError, StoreResult},
    models::{
        object::{
            ARCHIVE_CONTENT_TYPE, BUNDLE_SENTINEL, DEFAULT_CONTENT_TYPE, Origin, TEXT_CONTENT_TYPE,
            TEXT_SENTINEL,
        },
        upload::UploadRequest,
    },
};
use bytes::Bytes;
use std::{
    collections::HashSet,
    io::{Cursor, Read, Write},
};
use zip::{CompressionMethod, ZipArchive, ZipWriter, write::SimpleFileOptions};

/// Plaintext payload ready for sealing, plus what to record about it.
#[derive(Debug, Clone)]
pub struct Assembled {
    pub payload: Bytes,
    pub display_name: String,
    pub content_type: String,
    pub origin: Origin,
}

pub fn assemble(request: UploadRequest) -> StoreResult<Assembled> {
    match request {
        UploadRequest::TextOnly(text) => Ok(Assembled {
            payload: Bytes::from(text.into_bytes()),
            display_name: TEXT_SENTINEL.to_string(),
            content_type: TEXT_CONTENT_TYPE.to_string(),
            origin: Origin::Single,
        }),
        UploadRequest::SingleItem(item) => Ok(Assembled {
            payload: item.content,
            display_name: item.name,
            content_type: item
                .content_type
                .filter(|ct| !ct.is_empty())
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            origin: Origin::Single,
        }),
        UploadRequest::Bundle { text, items } => {
            let mut members: Vec<(&str, &[u8])> = Vec::with_capacity(items.len() + 1);
            if let Some(text) = text.as_deref() {
                members.push((TEXT_SENTINEL, text.as_bytes()));
            }
            members.extend(
                items
                    .iter()
                    .filter(|item| item.is_named())
                    .map(|item| (item.name.as_str(), item.content.as_ref())),
            );

            Ok(Assembled {
                payload: Bytes::from(build_archive(&members)?),
                display_name: BUNDLE_SENTINEL.to_string(),
                content_type: ARCHIVE_CONTENT_TYPE.to_string(),
                origin: Origin::Bundle,
            })
        }
    }
}

fn build_archive(members: &[(&str, &[u8])]) -> StoreResult<Vec<u8>> {
    let mut seen = HashSet::new();
    for (name, _) in members {
        if !seen.insert(*name) {
            return Err(StoreError::DuplicateMember(name.to_string()));
        }
    }

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in members {
        writer.start_file(*name, options)?;
        writer
            .write_all(content)
            .map_err(|e| StoreError::Archive(e.into()))?;
    }
    Ok(writer.finish()?.into_inner())
}

/// If the archive holds exactly one member and it is the inline-text
/// member, return that text.
pub fn sole_text_member(archive: &[u8]) -> StoreResult<Option<String>> {
    let mut archive = ZipArchive::new(Cursor::new(archive))
        .map_err(|e| StoreError::CorruptData(format!("unreadable archive: {e}")))?;
    if archive.len() != 1 {
        return Ok(None);
    }

    let mut member = archive
        .by_index(0)
        .map_err(|e| StoreError::CorruptData(format!("unreadable archive member: {e}")))?;
    if member.name() != TEXT_SENTINEL {
        return Ok(None);
    }

    let mut raw = Vec::new();
    member
        .read_to_end(&mut raw)
        .map_err(|e| StoreError::CorruptData(format!("unreadable archive member: {e}")))?;
    String::from_utf8(raw)
        .map(Some)
        .map_err(|_| StoreError::CorruptData(format!("{TEXT_SENTINEL} is not valid UTF-8")))
}

#[cfg(test)]
pub(crate) fn read_archive(archive: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = ZipArchive::new(Cursor::new(archive)).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut member = archive.by_index(i).unwrap();
            let mut raw = Vec::new();
            member.read_to_end(&mut raw).unwrap();
            (member.name().to_string(), raw)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::upload::UploadItem;

    #[test]
    fn test_text_only_payload() {
        let out = assemble(UploadRequest::classify(vec![], Some("hello".into())).unwrap()).unwrap();
        assert_eq!(out.payload, Bytes::from("hello"));
        assert_eq!(out.display_name, TEXT_SENTINEL);
        assert_eq!(out.content_type, TEXT_CONTENT_TYPE);
        assert_eq!(out.origin, Origin::Single);
    }

    #[test]
    fn test_single_item_is_unchanged() {
        let item = UploadItem::new("a.txt", "x");
        let out = assemble(UploadRequest::classify(vec![item], None).unwrap()).unwrap();
        assert_eq!(out.payload, Bytes::from("x"));
        assert_eq!(out.display_name, "a.txt");
        assert_eq!(out.content_type, DEFAULT_CONTENT_TYPE);

        let item = UploadItem::new("pic.png", vec![0x89, b'P', b'N', b'G']).with_content_type("image/png");
        let out = assemble(UploadRequest::SingleItem(item)).unwrap();
        assert_eq!(out.content_type, "image/png");
        assert_eq!(out.payload.as_ref(), &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_bundle_members_in_order() {
        let req = UploadRequest::classify(
            vec![UploadItem::new("a.txt", "x"), UploadItem::new("b.txt", "y")],
            None,
        )
        .unwrap();
        let out = assemble(req).unwrap();
        assert_eq!(out.display_name, BUNDLE_SENTINEL);
        assert_eq!(out.content_type, ARCHIVE_CONTENT_TYPE);
        assert_eq!(out.origin, Origin::Bundle);
        assert_eq!(
            read_archive(&out.payload),
            vec![
                ("a.txt".to_string(), b"x".to_vec()),
                ("b.txt".to_string(), b"y".to_vec()),
            ]
        );
        assert_eq!(sole_text_member(&out.payload).unwrap(), None);
    }

    #[test]
    fn test_bundle_text_goes_first() {
        let req = UploadRequest::classify(
            vec![UploadItem::new("z.bin", vec![0u8, 255]), UploadItem::new("", "skipped")],
            Some("note".into()),
        )
        .unwrap();
        let members = read_archive(&assemble(req).unwrap().payload);
        assert_eq!(
            members,
            vec![
                (TEXT_SENTINEL.to_string(), b"note".to_vec()),
                ("z.bin".to_string(), vec![0u8, 255]),
            ]
        );
    }

    #[test]
    fn test_text_only_bundle_is_previewable() {
        let req = UploadRequest::Bundle {
            text: Some("just text".into()),
            items: vec![],
        };
        let out = assemble(req).unwrap();
        assert_eq!(
            sole_text_member(&out.payload).unwrap().as_deref(),
            Some("just text")
        );
    }

    #[test]
    fn test_duplicate_members_rejected() {
        let req = UploadRequest::classify(
            vec![UploadItem::new("a.txt", "1"), UploadItem::new("a.txt", "2")],
            None,
        )
        .unwrap();
        assert!(matches!(
            assemble(req),
            Err(StoreError::DuplicateMember(name)) if name == "a.txt"
        ));

        let req = UploadRequest::classify(
            vec![UploadItem::new(TEXT_SENTINEL, "file")],
            Some("text".into()),
        )
        .unwrap();
        assert!(matches!(assemble(req), Err(StoreError::DuplicateMember(_))));
    }

    #[test]
    fn test_garbage_archive_is_corrupt() {
        assert!(matches!(
            sole_text_member(b"definitely not a zip"),
            Err(StoreError::CorruptData(_))
        ));
    }
}
