//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that round-trips a scratch blob through the backend

use crate::{backend::Metadata, services::share_service::ShareService};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

const PROBE_BODY: &[u8] = b"readyz";

/// `GET /healthz`
///
/// Very small liveness probe. Always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Writes, reads back and deletes a scratch blob through the configured
/// backend. HTTP 200 when the round trip succeeds, HTTP 503 otherwise.
pub async fn readyz(State(service): State<ShareService>) -> impl IntoResponse {
    let backend = service.backend();
    let key = format!("readyz/{}", Uuid::new_v4());

    let backend_check = match backend
        .put(&key, Bytes::from_static(PROBE_BODY), Metadata::new())
        .await
    {
        Ok(()) => {
            let check = match backend.get(&key).await {
                Ok(bytes) if bytes.as_ref() == PROBE_BODY => CheckStatus::ok(),
                Ok(_) => CheckStatus::failed("probe content mismatch"),
                Err(e) => CheckStatus::failed(format!("could not read probe: {}", e)),
            };
            match backend.delete(&key).await {
                Err(e) if check.ok => CheckStatus {
                    ok: true,
                    error: Some(format!("could not remove probe: {}", e)),
                },
                _ => check,
            }
        }
        Err(e) => CheckStatus::failed(format!("could not write probe: {}", e)),
    };

    let overall_ok = backend_check.ok;
    let mut checks = HashMap::new();
    checks.insert(backend.name(), backend_check);

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        live_objects: service.index().live_count(),
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    live_objects: usize,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}
