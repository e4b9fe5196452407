// Configuration source loading.
//
// Priority order:
// 1. Environment variables (RAILSYNC_* prefix)
// 2. Config file path from RAILSYNC_CONFIG
// 3. Inline config content from RAILSYNC_CONFIG_CONTENT
// 4. Default config files (./railsync.toml, ./config.toml)
// 5. Profile defaults (from RAILSYNC_PROFILES)

use super::env_overrides::{self, EnvSource, ENV_PREFIX};
use super::{Profiles, RuntimeConfig};
use anyhow::{Context, Result};
use std::env;
use std::path::Path;

const DEFAULT_FILES: [&str; 2] = ["./railsync.toml", "./config.toml"];

/// Load configuration for the detected profiles using process environment and files.
pub fn load_config(profiles: Profiles) -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::from_profile_defaults(&profiles);

    if let Some(file_config) = load_from_file()? {
        config.merge(file_config);
    }

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    config.validate()?;
    Ok(config)
}

fn parse_file(path: &Path) -> Result<RuntimeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn load_from_file() -> Result<Option<RuntimeConfig>> {
    if let Ok(path) = env::var(format!("{}CONFIG", ENV_PREFIX)) {
        return parse_file(Path::new(&path)).map(Some);
    }

    if let Ok(content) = env::var(format!("{}CONFIG_CONTENT", ENV_PREFIX)) {
        let config: RuntimeConfig = toml::from_str(&content)
            .context("Failed to parse inline config from RAILSYNC_CONFIG_CONTENT")?;
        return Ok(Some(config));
    }

    for path in DEFAULT_FILES {
        let path = Path::new(path);
        if path.exists() {
            return parse_file(path).map(Some);
        }
    }

    Ok(None)
}

/// Load configuration from a specific file path (for CLI --config flag).
/// Returns error if file doesn't exist or can't be parsed.
pub fn load_from_file_path(path: impl AsRef<Path>) -> Result<RuntimeConfig> {
    let file_config = parse_file(path.as_ref())?;

    let mut config = RuntimeConfig::from_profile_defaults(&Profiles::detect());
    config.merge(file_config);

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration with graceful fallback to defaults.
/// Tries standard config file locations, returns profile defaults if none found.
pub fn load_or_default(profiles: Profiles) -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::from_profile_defaults(&profiles);

    match load_from_file() {
        Ok(Some(file_config)) => config.merge(file_config),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "Ignoring unreadable config file"),
    }

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    config.validate()?;
    Ok(config)
}

struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }

    fn get_raw(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}
