//! Defines routes for sharing and health endpoints.
//!
//! ## Structure
//! - `POST /upload`        -> multipart upload (files, text_content, expiration_policy)
//! - `GET  /download/{id}` -> text preview or attachment; 404 unknown, 410 expired
//! - `GET  /healthz`, `GET /readyz`

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        share_handlers::{download, upload},
    },
    services::share_service::ShareService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build and return the router for all routes.
///
/// The router carries shared state (`ShareService`) to all handlers.
pub fn routes(max_upload_bytes: usize) -> Router<ShareService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/upload", post(upload))
        .route("/upload/", post(upload))
        .route("/download/{id}", get(download))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}
