use super::{
    FsConfig, GapStrategy, LogFormat, PublishBackend, RuntimeConfig, S3Config, ServerConfig,
    StorageBackend,
};
use anyhow::{anyhow, Context, Result};

pub const ENV_PREFIX: &str = "RAILSYNC_";

/// Abstraction over environment-variable lookups so tests and embedders can
/// supply their own source of overrides.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;

    /// Get an environment variable WITHOUT the RAILSYNC_ prefix
    /// Used for AWS standard variables (AWS_REGION, AWS_ENDPOINT_URL)
    fn get_raw(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides (highest priority) to the runtime config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    // Live interface
    if let Some(url) = get_env_string(env, "LIVE_INTERFACE_URL")? {
        config.live_interface.url = url;
    }
    if let Some(val) = get_env_u64(env, "REQUEST_TIMEOUT_SECS")? {
        config.live_interface.request_timeout_secs = val;
    }
    if let Some(val) = get_env_u32(env, "RETRY_MAX_ATTEMPTS")? {
        config.live_interface.retry.max_attempts = val;
    }
    if let Some(val) = get_env_u64(env, "RETRY_INITIAL_BACKOFF_MS")? {
        config.live_interface.retry.initial_backoff_ms = val;
    }
    if let Some(val) = get_env_u64(env, "RETRY_MAX_BACKOFF_MS")? {
        config.live_interface.retry.max_backoff_ms = val;
    }

    // Track-work sync
    if let Some(val) = get_env_bool(env, "TRACK_WORK_ENABLED")? {
        config.track_work.enabled = val;
    }
    if let Some(val) = get_env_u64(env, "TRACK_WORK_INTERVAL_SECS")? {
        config.track_work.interval_secs = val;
    }
    if let Some(val) = get_env_usize(env, "TRACK_WORK_MAX_CONCURRENT_FETCHES")? {
        config.track_work.max_concurrent_fetches = val;
    }
    if let Some(val) = get_env_usize(env, "TRACK_WORK_MAX_VERSIONS_PER_DOCUMENT")? {
        config.track_work.max_versions_per_document = val;
    }
    if let Some(strategy) = get_env_string(env, "TRACK_WORK_GAP_STRATEGY")? {
        config.track_work.gap_strategy = strategy
            .parse::<GapStrategy>()
            .context("Invalid RAILSYNC_TRACK_WORK_GAP_STRATEGY value")?;
    }

    // Train locations
    if let Some(val) = get_env_bool(env, "TRAIN_LOCATIONS_ENABLED")? {
        config.train_locations.enabled = val;
    }
    if let Some(val) = get_env_u64(env, "TRAIN_LOCATIONS_INTERVAL_MS")? {
        config.train_locations.interval_ms = val;
    }
    if let Some(path) = get_env_string(env, "TRACK_GEOMETRY_PATH")? {
        config.train_locations.track.geometry_path = if path.is_empty() { None } else { Some(path) };
    }
    if let Some(val) = get_env_f64(env, "TRACK_MAX_DISTANCE_M")? {
        config.train_locations.track.max_distance_m = val;
    }

    // Publishing
    if let Some(backend) = get_env_string(env, "PUBLISH_BACKEND")? {
        config.publish.backend = Some(
            backend
                .parse::<PublishBackend>()
                .context("Invalid RAILSYNC_PUBLISH_BACKEND value")?,
        );
    }
    if let Some(endpoint) = get_env_string(env, "PUBLISH_ENDPOINT")? {
        config.publish.endpoint = Some(endpoint);
    }
    if let Some(profiles) = get_env_string(env, "PROFILES")? {
        config.publish.profiles = super::Profiles::parse(&profiles).names().to_vec();
    }

    // Server configuration (listen addr, log level/format)
    if let Some(addr) = get_env_string(env, "LISTEN_ADDR")? {
        ensure_server(config).listen_addr = addr;
    }
    if let Some(level) = get_env_string(env, "LOG_LEVEL")? {
        ensure_server(config).log_level = level;
    }
    if let Some(format) = get_env_string(env, "LOG_FORMAT")? {
        let parsed = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
        ensure_server(config).log_format = parsed;
    }

    // Storage backend
    if let Some(backend) = get_env_string(env, "STORAGE_BACKEND")? {
        config.storage.backend = backend
            .parse::<StorageBackend>()
            .context("Invalid RAILSYNC_STORAGE_BACKEND value")?;
    }
    // Filesystem storage
    if let Some(path) = get_env_string(env, "STORAGE_PATH")? {
        config.storage.fs.get_or_insert_with(FsConfig::default).path = path;
    }

    // S3 storage
    if let Some(bucket) = get_env_string(env, "S3_BUCKET")? {
        ensure_s3(config).bucket = bucket;
    }
    if let Some(region) = get_env_string(env, "S3_REGION")? {
        ensure_s3(config).region = region;
    } else if let Some(region) = env.get_raw("AWS_REGION") {
        // Standard AWS variable, only when the S3 section is in use
        if let Some(s3) = config.storage.s3.as_mut() {
            if s3.region.is_empty() {
                s3.region = region;
            }
        }
    }
    if let Some(endpoint) = get_env_string(env, "S3_ENDPOINT")? {
        ensure_s3(config).endpoint = Some(endpoint);
    } else if let Some(endpoint) = env.get_raw("AWS_ENDPOINT_URL") {
        if let Some(s3) = config.storage.s3.as_mut() {
            s3.endpoint.get_or_insert(endpoint);
        }
    }
    if let Some(prefix) = get_env_string(env, "S3_PREFIX")? {
        ensure_s3(config).prefix = normalize_prefix(prefix);
    }

    Ok(())
}

fn ensure_s3(config: &mut RuntimeConfig) -> &mut S3Config {
    config.storage.s3.get_or_insert_with(|| S3Config {
        bucket: String::new(),
        region: String::new(),
        endpoint: None,
        prefix: None,
    })
}

fn ensure_server(config: &mut RuntimeConfig) -> &mut ServerConfig {
    config.server.get_or_insert_with(ServerConfig::default)
}

fn get_env_string<E: EnvSource>(env: &E, key: &str) -> Result<Option<String>> {
    Ok(env.get(key))
}

fn get_env_parsed<E, T>(env: &E, key: &str, expected: &str) -> Result<Option<T>>
where
    E: EnvSource,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get_env_string(env, key)? {
        Some(val) => {
            let parsed = val.trim().parse::<T>().map_err(|e| {
                anyhow!(
                    "Failed to parse {}{} (expected {}): {}",
                    ENV_PREFIX,
                    key,
                    expected,
                    e
                )
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_usize<E: EnvSource>(env: &E, key: &str) -> Result<Option<usize>> {
    get_env_parsed(env, key, "unsigned integer")
}

fn get_env_u32<E: EnvSource>(env: &E, key: &str) -> Result<Option<u32>> {
    get_env_parsed(env, key, "unsigned integer")
}

fn get_env_u64<E: EnvSource>(env: &E, key: &str) -> Result<Option<u64>> {
    get_env_parsed(env, key, "unsigned integer")
}

fn get_env_f64<E: EnvSource>(env: &E, key: &str) -> Result<Option<f64>> {
    get_env_parsed(env, key, "number")
}

fn get_env_bool<E: EnvSource>(env: &E, key: &str) -> Result<Option<bool>> {
    get_env_parsed(env, key, "bool")
}

fn normalize_prefix(prefix: String) -> Option<String> {
    if prefix.is_empty() {
        None
    } else if prefix.ends_with('/') {
        Some(prefix)
    } else {
        Some(format!("{}/", prefix))
    }
}
