use crate::services::envelope::SecretKey;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::{env, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;

pub const KEY_ENV: &str = "ENCRYPTION_KEY";

/// Startup failures that must stop the process.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ENCRYPTION_KEY environment variable not set")]
    MissingKey,
    #[error("encryption key must be 32 bytes (256 bits), got {0}")]
    InvalidKeyLength(usize),
    #[error("invalid value `{value}` for {name}")]
    InvalidValue { name: &'static str, value: String },
}

/// Which blob backend to store envelopes in.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    Local,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "local" => Ok(BackendKind::Local),
            _ => Err(ConfigError::InvalidValue {
                name: "EPHEMERAL_STORE_BACKEND",
                value: s.to_string(),
            }),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: BackendKind,
    pub storage_dir: PathBuf,
    /// How often expired objects are reaped; `None` disables the sweeper.
    pub sweep_interval: Option<Duration>,
    pub max_upload_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Ephemeral encrypted file and text sharing")]
pub struct Args {
    /// Host to bind to (overrides EPHEMERAL_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides EPHEMERAL_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Blob backend (overrides EPHEMERAL_STORE_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Directory for the local backend (overrides EPHEMERAL_STORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// Seconds between expiry sweeps, 0 disables (overrides EPHEMERAL_STORE_SWEEP_INTERVAL_SECS)
    #[arg(long)]
    pub sweep_interval_secs: Option<u64>,

    /// Largest accepted upload body (overrides EPHEMERAL_STORE_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::from_sources(Args::parse(), |name| env::var(name).ok())
    }

    /// Merge CLI args over values looked up by `lookup`, falling back to defaults.
    pub fn from_sources(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_host = lookup("EPHEMERAL_STORE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = parse_var(&lookup, "EPHEMERAL_STORE_PORT")?.unwrap_or(3000);
        let env_backend = parse_var(&lookup, "EPHEMERAL_STORE_BACKEND")?.unwrap_or(BackendKind::Local);
        let env_storage = lookup("EPHEMERAL_STORE_STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/blobs"));
        let env_sweep = parse_var(&lookup, "EPHEMERAL_STORE_SWEEP_INTERVAL_SECS")?.unwrap_or(60);
        let env_max_upload =
            parse_var(&lookup, "EPHEMERAL_STORE_MAX_UPLOAD_BYTES")?.unwrap_or(100 * 1024 * 1024);

        let sweep_secs: u64 = args.sweep_interval_secs.unwrap_or(env_sweep);

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            backend: args.backend.unwrap_or(env_backend),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &'static str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(name)
        .map(|value| {
            value
                .parse::<T>()
                .with_context(|| format!("parsing {} value `{}`", name, value))
        })
        .transpose()
}

/// Load the process-wide encryption key from `ENCRYPTION_KEY`.
pub fn load_secret_key() -> Result<SecretKey, ConfigError> {
    secret_key_from(env::var(KEY_ENV).ok())
}

fn secret_key_from(value: Option<String>) -> Result<SecretKey, ConfigError> {
    match value {
        Some(value) if !value.is_empty() => SecretKey::from_encoded(&value),
        _ => Err(ConfigError::MissingKey),
    }
}
