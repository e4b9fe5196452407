// Configuration validation
//
// Validates that required fields are present and values are sensible

use super::*;
use anyhow::{bail, Result};
use tracing::warn;

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_live_interface_config(config)?;
    validate_track_work_config(&config.track_work)?;
    validate_train_location_config(&config.train_locations)?;
    validate_publish_config(&config.publish)?;
    validate_storage_config(&config.storage)?;

    if let Some(ref server) = config.server {
        validate_server_config(server)?;
    }

    Ok(())
}

fn validate_live_interface_config(config: &RuntimeConfig) -> Result<()> {
    let live = &config.live_interface;

    if !live.is_configured() {
        if config.track_work.enabled || config.train_locations.enabled {
            warn!(
                "live_interface.url is not set; track-work sync and train locations are disabled \
                 (set {}LIVE_INTERFACE_URL to enable)",
                ENV_PREFIX
            );
        }
        return Ok(());
    }

    if !live.url.starts_with("http://") && !live.url.starts_with("https://") {
        bail!(
            "live_interface.url must be an http(s) URL, got '{}'",
            live.url
        );
    }

    if live.request_timeout_secs == 0 {
        bail!("live_interface.request_timeout_secs must be greater than 0");
    }

    let retry = &live.retry;
    if retry.max_attempts == 0 {
        bail!("live_interface.retry.max_attempts must be at least 1");
    }
    if retry.multiplier < 1.0 {
        bail!("live_interface.retry.multiplier must be >= 1.0");
    }
    if retry.initial_backoff_ms > retry.max_backoff_ms {
        bail!("live_interface.retry.initial_backoff_ms must not exceed max_backoff_ms");
    }

    Ok(())
}

fn validate_track_work_config(config: &TrackWorkConfig) -> Result<()> {
    if config.interval_secs == 0 {
        bail!("track_work.interval_secs must be greater than 0");
    }

    if config.max_concurrent_fetches == 0 {
        bail!("track_work.max_concurrent_fetches must be greater than 0");
    }

    if config.max_versions_per_document == 0 {
        bail!("track_work.max_versions_per_document must be greater than 0");
    }

    if config.max_concurrent_fetches > 64 {
        warn!(
            max_concurrent_fetches = config.max_concurrent_fetches,
            "track_work.max_concurrent_fetches is very large; the live interface may throttle"
        );
    }

    Ok(())
}

fn validate_train_location_config(config: &TrainLocationConfig) -> Result<()> {
    if config.interval_ms == 0 {
        bail!("train_locations.interval_ms must be greater than 0");
    }

    if !config.track.max_distance_m.is_finite() || config.track.max_distance_m < 0.0 {
        bail!("train_locations.track.max_distance_m must be a non-negative number");
    }

    for sentinel in &config.sentinels {
        if !(-90.0..=90.0).contains(&sentinel.lat) || !(-180.0..=180.0).contains(&sentinel.lon) {
            bail!(
                "train_locations.sentinels entry ({}, {}) is not a valid coordinate",
                sentinel.lat,
                sentinel.lon
            );
        }
    }

    Ok(())
}

fn validate_publish_config(config: &PublishConfig) -> Result<()> {
    if config.backend() == PublishBackend::Http {
        let endpoint = config.endpoint.as_deref().unwrap_or_default();
        if endpoint.is_empty() {
            bail!(
                "Publish endpoint is required for the http backend\n\n\
                How to fix:\n\
                  • Environment: export {}PUBLISH_ENDPOINT=http://bridge:8080/publish\n\
                  • TOML: [publish]\n              endpoint = \"http://bridge:8080/publish\"\n\
                  • Or select another backend: {}PUBLISH_BACKEND=log",
                ENV_PREFIX,
                ENV_PREFIX
            );
        }
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<()> {
    match config.backend {
        StorageBackend::Fs => {
            let fs = config
                .fs
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("fs storage backend requires 'fs' configuration"))?;

            if fs.path.is_empty() {
                bail!(
                    "Filesystem path is required\n\n\
                    How to fix:\n\
                      • Environment: export {}STORAGE_PATH=/data/railsync\n\
                      • TOML: [storage.fs]\n              path = \"/data/railsync\"",
                    ENV_PREFIX
                );
            }
        }
        StorageBackend::S3 => {
            let s3 = config
                .s3
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("s3 storage backend requires 's3' configuration"))?;

            if s3.bucket.is_empty() {
                bail!(
                    "S3 bucket name is required\n\n\
                    How to fix:\n\
                      • Environment: export {}S3_BUCKET=my-bucket\n\
                      • TOML: [storage.s3]\n              bucket = \"my-bucket\"",
                    ENV_PREFIX
                );
            }

            if s3.region.is_empty() {
                bail!(
                    "S3 region is required\n\n\
                    How to fix:\n\
                      • Environment: export {}S3_REGION=eu-north-1\n\
                      • TOML: [storage.s3]\n              region = \"eu-north-1\"",
                    ENV_PREFIX
                );
            }
        }
    }

    Ok(())
}

fn validate_server_config(config: &ServerConfig) -> Result<()> {
    if config.listen_addr.is_empty() {
        bail!("server.listen_addr must not be empty");
    }

    // Basic validation that it looks like an address
    if !config.listen_addr.contains(':') {
        bail!("server.listen_addr must be in format 'host:port'");
    }

    Ok(())
}
