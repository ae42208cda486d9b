//! HTTP handlers for uploads and downloads.
//! Builds an [`UploadRequest`] from the multipart form and delegates the
//! encrypted-bundle lifecycle to `ShareService`.

use crate::{
    errors::{AppError, StoreError},
    models::{
        object::DEFAULT_CONTENT_TYPE,
        policy::ExpirationPolicy,
        upload::{UploadItem, UploadRequest},
    },
    services::{
        lifecycle::Download,
        share_service::{ShareService, UploadReceipt},
    },
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::Serialize;
use std::fmt::Write as _;
use tracing::debug;

#[derive(Serialize, Debug)]
pub struct UploadResponse {
    pub uploads: Vec<UploadReceipt>,
}

#[derive(Serialize, Debug)]
struct PreviewResponse {
    #[serde(rename = "type")]
    kind: &'static str,
    content: String,
    filename: String,
}

fn multipart_error(err: MultipartError) -> AppError {
    match err.status() {
        StatusCode::BAD_REQUEST => StoreError::InvalidUpload(err.body_text()).into(),
        status => AppError::new(status, "invalid_upload", err.body_text()),
    }
}

/// `POST /upload`
///
/// Multipart form with `files`, `text_content` and
/// `expiration_policy` fields.
pub async fn upload(
    State(service): State<ShareService>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut items = Vec::new();
    let mut text = None;
    let mut policy_token = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let content = field.bytes().await.map_err(multipart_error)?;
                let item = UploadItem::new(filename, content);
                items.push(match content_type {
                    Some(content_type) => item.with_content_type(content_type),
                    None => item,
                });
            }
            "text_content" => text = Some(field.text().await.map_err(multipart_error)?),
            "expiration_policy" => {
                policy_token = Some(field.text().await.map_err(multipart_error)?)
            }
            other => debug!("ignoring unknown form field `{}`", other),
        }
    }

    let policy = match policy_token.as_deref() {
        Some(token) => token.parse::<ExpirationPolicy>()?,
        None => ExpirationPolicy::default(),
    };
    let request = UploadRequest::classify(items, text)?;
    let receipt = service.upload(request, policy).await?;

    Ok(Json(UploadResponse {
        uploads: vec![receipt],
    }))
}

/// `GET /download/{id}`
///
/// Text previews come back as JSON, everything else as an attachment.
pub async fn download(
    State(service): State<ShareService>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let response = match service.download(&id).await? {
        Download::Text { filename, content } => preview("text", filename, content),
        Download::BundleText { filename, content } => preview("bundle_text", filename, content),
        Download::Attachment {
            filename,
            content_type,
            content,
        } => attachment(&filename, &content_type, content),
    };
    Ok(response)
}

fn preview(kind: &'static str, filename: String, content: String) -> Response {
    let mut response = Json(PreviewResponse {
        kind,
        content,
        filename,
    })
    .into_response();
    set_no_store(response.headers_mut());
    response
}

fn attachment(filename: &str, content_type: &str, content: Bytes) -> Response {
    let length = content.len();
    let mut response = Response::new(Body::from(content));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE)),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&content_disposition(filename))
            .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
    );
    set_no_store(headers);
    response
}

fn set_no_store(headers: &mut HeaderMap) {
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
}

/// `attachment; filename="<ascii fallback>"; filename*=UTF-8''<percent-encoded>`
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    let mut encoded = String::with_capacity(filename.len());
    for byte in filename.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            let _ = write!(encoded, "%{:02X}", byte);
        }
    }

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    )
}
