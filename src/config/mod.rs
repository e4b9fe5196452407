// railsync configuration
//
// Supports configuration from multiple sources:
// 1. Environment variables (highest priority)
// 2. Config file path from RAILSYNC_CONFIG env var
// 3. Config file contents from RAILSYNC_CONFIG_CONTENT env var
// 4. Default config file locations (./railsync.toml, ./config.toml)
// 5. Deployment profile defaults (lowest priority)

use crate::model::Coordinate;
use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

mod env_overrides;
mod profile;
mod sources;
mod validation;

pub use env_overrides::{EnvSource, ENV_PREFIX};
pub use profile::Profiles;

/// Main runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub live_interface: LiveInterfaceConfig,

    #[serde(default)]
    pub track_work: TrackWorkConfig,

    #[serde(default)]
    pub train_locations: TrainLocationConfig,

    #[serde(default)]
    pub publish: PublishConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,
}

/// Remote live interface connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveInterfaceConfig {
    /// Base URL. Empty disables both subsystems.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for LiveInterfaceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

impl LiveInterfaceConfig {
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 5_000,
            multiplier: 2.0,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.multiplier,
        }
    }
}

/// Track-work notification sync settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackWorkConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_track_work_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    /// Upper bound on versions fetched for one document in one cycle.
    #[serde(default = "default_max_versions_per_document")]
    pub max_versions_per_document: usize,
    #[serde(default)]
    pub gap_strategy: GapStrategy,
}

fn default_enabled() -> bool {
    true
}

fn default_track_work_interval_secs() -> u64 {
    300
}

fn default_max_concurrent_fetches() -> usize {
    8
}

fn default_max_versions_per_document() -> usize {
    500
}

impl Default for TrackWorkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_track_work_interval_secs(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            max_versions_per_document: default_max_versions_per_document(),
            gap_strategy: GapStrategy::default(),
        }
    }
}

impl TrackWorkConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// How missing document versions are computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapStrategy {
    /// Fetch below the stored minimum and above the stored maximum only.
    #[default]
    Bounds,
    /// Fetch every version in 1..=latest that is not stored.
    Full,
}

impl std::fmt::Display for GapStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GapStrategy::Bounds => write!(f, "bounds"),
            GapStrategy::Full => write!(f, "full"),
        }
    }
}

impl std::str::FromStr for GapStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "bounds" | "minmax" => Ok(GapStrategy::Bounds),
            "full" => Ok(GapStrategy::Full),
            _ => anyhow::bail!("Unsupported gap strategy: {}. Supported: bounds, full", s),
        }
    }
}

/// Train location pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainLocationConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_train_location_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_sentinels")]
    pub sentinels: Vec<SentinelConfig>,
    #[serde(default)]
    pub track: TrackConfig,
}

fn default_train_location_interval_ms() -> u64 {
    1_000
}

fn default_sentinels() -> Vec<SentinelConfig> {
    vec![
        SentinelConfig {
            lat: 60.170799,
            lon: 24.9375,
        },
        SentinelConfig {
            lat: 60.1708,
            lon: 24.9375,
        },
    ]
}

impl Default for TrainLocationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_train_location_interval_ms(),
            sentinels: default_sentinels(),
            track: TrackConfig::default(),
        }
    }
}

impl TrainLocationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// A placeholder coordinate the live interface reports for unresolved positions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentinelConfig {
    pub lat: f64,
    pub lon: f64,
}

impl From<SentinelConfig> for Coordinate {
    fn from(s: SentinelConfig) -> Self {
        Coordinate::new(s.lat, s.lon)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackConfig {
    /// GeoJSON file with the rail network geometry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry_path: Option<String>,
    #[serde(default = "default_max_distance_m")]
    pub max_distance_m: f64,
}

fn default_max_distance_m() -> f64 {
    1_000.0
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            geometry_path: None,
            max_distance_m: default_max_distance_m(),
        }
    }
}

/// Where accepted train locations are republished
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Unset means the profile default, or `log` when no profile sets one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<PublishBackend>,
    /// Bridge endpoint for the `http` backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Active deployment profiles. Filled from `RAILSYNC_PROFILES` when absent.
    #[serde(default)]
    pub profiles: Vec<String>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            backend: None,
            endpoint: None,
            profiles: Vec::new(),
        }
    }
}

impl PublishConfig {
    pub fn backend(&self) -> PublishBackend {
        self.backend.unwrap_or(PublishBackend::Log)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishBackend {
    Http,
    Log,
    None,
}

impl std::fmt::Display for PublishBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishBackend::Http => write!(f, "http"),
            PublishBackend::Log => write!(f, "log"),
            PublishBackend::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for PublishBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "http" | "bridge" => Ok(PublishBackend::Http),
            "log" => Ok(PublishBackend::Log),
            "none" | "off" => Ok(PublishBackend::None),
            _ => anyhow::bail!("Unsupported publish backend: {}. Supported: http, log, none", s),
        }
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs: Option<FsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Config>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Fs,
            fs: Some(FsConfig::default()),
            s3: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Fs,
    S3,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Fs => write!(f, "fs"),
            StorageBackend::S3 => write!(f, "s3"),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fs" | "filesystem" => Ok(StorageBackend::Fs),
            "s3" | "aws" => Ok(StorageBackend::S3),
            _ => anyhow::bail!("Unsupported storage backend: {}. Supported: fs, s3", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsConfig {
    pub path: String,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            path: "./data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Optional path prefix for all stored objects (e.g., "railsync/")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

/// Status server and logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl RuntimeConfig {
    /// Load configuration from all sources with priority
    pub fn load() -> Result<Self> {
        sources::load_config(Profiles::detect())
    }

    /// Load configuration from a specific file path (for CLI usage).
    pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        sources::load_from_file_path(path)
    }

    /// Load configuration with graceful fallback to defaults.
    /// Does not fail if config file is missing - uses profile defaults instead.
    pub fn load_or_default() -> Result<Self> {
        sources::load_or_default(Profiles::detect())
    }

    /// Construct a config that contains only profile defaults (no env or files).
    pub fn from_profile_defaults(profiles: &Profiles) -> Self {
        profile_defaults(profiles)
    }

    /// Merge another config into this one (used for TOML layering).
    pub fn merge(&mut self, other: RuntimeConfig) {
        self.live_interface = other.live_interface;
        self.track_work = other.track_work;
        self.train_locations = other.train_locations;
        self.storage = other.storage;

        // Publish settings layer field by field so profile defaults survive
        let publish = other.publish;
        if publish.backend.is_some() {
            self.publish.backend = publish.backend;
        }
        if publish.endpoint.is_some() {
            self.publish.endpoint = publish.endpoint;
        }
        if !publish.profiles.is_empty() {
            self.publish.profiles = publish.profiles;
        }

        if other.server.is_some() {
            self.server = other.server;
        }
    }

    /// Apply environment overrides from a custom source.
    pub fn apply_env_overrides_from<E: EnvSource>(&mut self, env: &E) -> Result<()> {
        env_overrides::apply_env_overrides(self, env)
    }

    /// Build a configuration from inline config content plus overrides
    /// supplied by an `EnvSource`. Used by tests and embedders that do not
    /// want the process environment consulted.
    pub fn load_with_env<E: EnvSource>(inline_config: Option<&str>, env: &E) -> Result<Self> {
        let profiles = env
            .get("PROFILES")
            .map(|raw| Profiles::parse(&raw))
            .unwrap_or_default();
        let mut config = RuntimeConfig::from_profile_defaults(&profiles);

        if let Some(inline) = inline_config {
            let file_config: RuntimeConfig =
                toml::from_str(inline).context("Failed to parse inline config content")?;
            config.merge(file_config);
        }

        config.apply_env_overrides_from(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Active deployment profiles as configured.
    pub fn profiles(&self) -> Profiles {
        Profiles::from_names(self.publish.profiles.clone())
    }
}

fn profile_defaults(profiles: &Profiles) -> RuntimeConfig {
    let defaults = profiles.defaults();

    RuntimeConfig {
        live_interface: LiveInterfaceConfig::default(),
        track_work: TrackWorkConfig::default(),
        train_locations: TrainLocationConfig::default(),
        publish: PublishConfig {
            backend: Some(defaults.publish_backend),
            endpoint: None,
            profiles: profiles.names().to_vec(),
        },
        storage: StorageConfig::default(),
        server: Some(ServerConfig {
            log_format: defaults.log_format,
            ..ServerConfig::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_backend_from_str() {
        assert_eq!("fs".parse::<StorageBackend>().unwrap(), StorageBackend::Fs);
        assert_eq!("s3".parse::<StorageBackend>().unwrap(), StorageBackend::S3);
        assert_eq!(
            "filesystem".parse::<StorageBackend>().unwrap(),
            StorageBackend::Fs
        );
        assert!("r2".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_default_configs() {
        let track_work = TrackWorkConfig::default();
        assert_eq!(track_work.interval(), Duration::from_secs(300));
        assert_eq!(track_work.max_concurrent_fetches, 8);
        assert_eq!(track_work.max_versions_per_document, 500);
        assert_eq!(track_work.gap_strategy, GapStrategy::Bounds);

        let locations = TrainLocationConfig::default();
        assert_eq!(locations.interval(), Duration::from_millis(1000));
        assert_eq!(locations.sentinels.len(), 2);
        assert_eq!(locations.track.max_distance_m, 1000.0);

        let server = ServerConfig::default();
        assert_eq!(server.log_format, LogFormat::Text);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: RuntimeConfig = toml::from_str(
            r#"
            [live_interface]
            url = "https://example.test/api"

            [track_work]
            gap_strategy = "full"

            [storage]
            backend = "s3"
            [storage.s3]
            bucket = "rail"
            region = "eu-north-1"
            "#,
        )
        .unwrap();

        assert!(config.live_interface.is_configured());
        assert_eq!(config.live_interface.request_timeout_secs, 30);
        assert_eq!(config.track_work.gap_strategy, GapStrategy::Full);
        assert_eq!(config.track_work.interval_secs, 300);
        assert!(config.train_locations.enabled);
        assert_eq!(config.storage.backend, StorageBackend::S3);
        assert_eq!(config.publish.backend, None);
        assert_eq!(config.publish.backend(), PublishBackend::Log);
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = RetryPolicy::from(&RetryConfig {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
            multiplier: 3.0,
        });
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_backoff, Duration::from_millis(100));
        assert_eq!(policy.max_backoff, Duration::from_secs(1));
    }

    #[test]
    fn test_merge_keeps_profiles_when_file_has_none() {
        let mut base = RuntimeConfig::from_profile_defaults(&Profiles::parse("prd"));
        let file: RuntimeConfig = toml::from_str("[publish]\nbackend = \"none\"\n").unwrap();
        base.merge(file);
        assert_eq!(base.publish.backend(), PublishBackend::None);
        assert_eq!(base.publish.profiles, vec!["prd".to_string()]);
    }

    struct PairsEnv(Vec<(&'static str, &'static str)>);

    impl EnvSource for PairsEnv {
        fn get(&self, key: &str) -> Option<String> {
            let key = format!("{}{}", ENV_PREFIX, key);
            self.0
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }

        fn get_raw(&self, _key: &str) -> Option<String> {
            None
        }
    }

    fn production_env() -> PairsEnv {
        PairsEnv(vec![
            ("RAILSYNC_PROFILES", "prd"),
            ("RAILSYNC_PUBLISH_ENDPOINT", "http://bridge.test/publish"),
        ])
    }

    #[test]
    fn test_production_backend_survives_file_without_publish_section() {
        let config = RuntimeConfig::load_with_env(
            Some("[live_interface]\nurl = \"http://live.test\"\n"),
            &production_env(),
        )
        .unwrap();
        assert_eq!(config.publish.backend(), PublishBackend::Http);
        assert_eq!(config.publish.profiles, vec!["prd".to_string()]);

        let without_file = RuntimeConfig::load_with_env(None, &production_env()).unwrap();
        assert_eq!(without_file.publish.backend(), PublishBackend::Http);
    }

    #[test]
    fn test_publish_section_without_backend_keeps_profile_default() {
        let config = RuntimeConfig::load_with_env(
            Some("[publish]\nendpoint = \"http://other-bridge.test/publish\"\n"),
            &PairsEnv(vec![("RAILSYNC_PROFILES", "prd")]),
        )
        .unwrap();
        assert_eq!(config.publish.backend(), PublishBackend::Http);
        assert_eq!(
            config.publish.endpoint.as_deref(),
            Some("http://other-bridge.test/publish")
        );
    }

    #[test]
    fn test_file_backend_overrides_profile_default() {
        let config = RuntimeConfig::load_with_env(
            Some("[publish]\nbackend = \"log\"\n"),
            &PairsEnv(vec![("RAILSYNC_PROFILES", "prd")]),
        )
        .unwrap();
        assert_eq!(config.publish.backend(), PublishBackend::Log);
    }
}
