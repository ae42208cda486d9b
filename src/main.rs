use anyhow::{Context, Result};
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod backend;
mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use backend::{BlobBackend, LocalBackend, MemoryBackend};
use config::BackendKind;
use services::{lifecycle, share_service::ShareService};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;
    tracing::info!("Starting ephemeral-store with config: {:?}", cfg);

    // --- Encryption key (fatal if missing or malformed) ---
    let key = config::load_secret_key().context("loading encryption key")?;

    // --- Blob backend ---
    let backend: Arc<dyn BlobBackend> = match cfg.backend {
        BackendKind::Memory => Arc::new(MemoryBackend::new()),
        BackendKind::Local => {
            let local = LocalBackend::new(&cfg.storage_dir)
                .await
                .with_context(|| format!("opening storage dir {}", cfg.storage_dir.display()))?;
            tracing::info!("Storing blobs under {}", cfg.storage_dir.display());
            Arc::new(local)
        }
    };

    // --- Initialize core service ---
    let service = ShareService::new(backend, key);

    if let Some(interval) = cfg.sweep_interval {
        lifecycle::spawn_sweeper(service.clone(), interval);
        tracing::info!("Expiry sweeper running every {:?}", interval);
    }

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.max_upload_bytes).with_state(service);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
