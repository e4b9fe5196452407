use super::{LogFormat, PublishBackend};

const PRODUCTION: &str = "prd";
const DEFAULT_PROFILE: &str = "dev";

/// Active deployment profiles, e.g. `dev`, `tst,beta`, `prd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profiles {
    names: Vec<String>,
}

impl Default for Profiles {
    fn default() -> Self {
        Self {
            names: vec![DEFAULT_PROFILE.to_string()],
        }
    }
}

impl Profiles {
    /// Read `RAILSYNC_PROFILES`, falling back to `dev`.
    pub fn detect() -> Self {
        std::env::var(format!("{}PROFILES", super::ENV_PREFIX))
            .map(|raw| Self::parse(&raw))
            .unwrap_or_default()
    }

    /// Parse a comma separated list. Blank input yields the default profile.
    pub fn parse(raw: &str) -> Self {
        Self::from_names(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn from_names(names: Vec<String>) -> Self {
        if names.is_empty() {
            Self::default()
        } else {
            Self { names }
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_production(&self) -> bool {
        self.names.iter().any(|p| p == PRODUCTION)
    }

    /// Topic prefix that keeps non-production deployments apart on a shared broker.
    /// Production publishes without a prefix.
    pub fn deployment_prefix(&self) -> String {
        if self.is_production() {
            String::new()
        } else {
            self.names.join(",")
        }
    }

    pub fn defaults(&self) -> ProfileDefaults {
        if self.is_production() {
            ProfileDefaults {
                publish_backend: PublishBackend::Http,
                log_format: LogFormat::Json,
            }
        } else {
            ProfileDefaults {
                publish_backend: PublishBackend::Log,
                log_format: LogFormat::Text,
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfileDefaults {
    pub publish_backend: PublishBackend,
    pub log_format: LogFormat,
}
