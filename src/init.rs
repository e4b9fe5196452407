// Initialization utilities
//
// Storage backend and logging/tracing setup

use crate::config::{LogFormat, RuntimeConfig, StorageBackend};
use crate::store;
use anyhow::Result;
use tracing::info;

/// Build the storage operator from RuntimeConfig
pub(crate) fn init_storage(config: &RuntimeConfig) -> Result<opendal::Operator> {
    match config.storage.backend {
        StorageBackend::Fs => {
            if let Some(fs) = config.storage.fs.as_ref() {
                info!(path = %fs.path, "Using filesystem storage");
            }
        }
        StorageBackend::S3 => {
            if let Some(s3) = config.storage.s3.as_ref() {
                info!(
                    bucket = %s3.bucket,
                    region = %s3.region,
                    prefix = s3.prefix.as_deref().unwrap_or(""),
                    "Using S3 storage"
                );
            }
        }
    }

    store::build_operator(&config.storage)
        .map_err(|e| anyhow::anyhow!("Failed to initialize storage: {}", e))
}

/// Initialize tracing/logging from RuntimeConfig
pub fn init_tracing(config: &RuntimeConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let server = config.server.clone().unwrap_or_default();

    // RUST_LOG wins over the configured level when set
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&server.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    // Try to set the global subscriber; ignore error if already set (idempotent)
    let _ = match server.log_format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))
        }
        LogFormat::Text => tracing::subscriber::set_global_default(registry.with(fmt::layer())),
    };
}
