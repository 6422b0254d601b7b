use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "blobtier.toml";

/// Prefix for environment overrides, e.g. `BLOBTIER__LIFECYCLE__CONTAINER`.
pub const ENV_PREFIX: &str = "BLOBTIER__";

/// Longest accepted `lifecycle.interval` (one year).
pub const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 3600);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage DSN (`memory://`, `file:///path`, `s3://host/bucket`, `az://account/container`)
    pub dsn: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("memory://"),
        }
    }
}

/// A lifecycle rule as written in configuration.
///
/// Class names are kept as strings here and parsed by the lifecycle crate,
/// which owns the set of known storage classes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RuleConfig {
    /// Optional rule name used in logs and transition reasons.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Source storage class, or `any`.
    pub source: String,
    /// Minimum time since last modification before the rule applies.
    #[serde(with = "humantime_serde")]
    pub min_age: Duration,
    /// Storage class to move matching objects to.
    pub target: String,
    /// Lower numbers win when several rules match the same object.
    #[serde(default)]
    pub priority: u32,
}

fn default_rules() -> Vec<RuleConfig> {
    vec![RuleConfig {
        name: Some("hot-to-cool".to_string()),
        source: "hot".to_string(),
        min_age: Duration::from_secs(30 * 24 * 3600), // 30 days
        target: "cool".to_string(),
        priority: 1,
    }]
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Enable the periodic tiering job.
    ///
    /// Env: BLOBTIER__LIFECYCLE__ENABLED
    pub enabled: bool,

    /// Container (bucket prefix) whose objects are tiered.
    ///
    /// Env: BLOBTIER__LIFECYCLE__CONTAINER
    pub container: String,

    /// Interval between evaluation cycles.
    ///
    /// Env: BLOBTIER__LIFECYCLE__INTERVAL
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Run one cycle immediately at start-up instead of waiting an interval.
    ///
    /// Env: BLOBTIER__LIFECYCLE__RUN_ON_START
    pub run_on_start: bool,

    /// Maximum number of tier changes in flight at once.
    ///
    /// Env: BLOBTIER__LIFECYCLE__MAX_CONCURRENCY
    pub max_concurrency: usize,

    /// Log planned transitions without applying them.
    ///
    /// Env: BLOBTIER__LIFECYCLE__DRY_RUN
    pub dry_run: bool,

    /// Lifecycle rules, in declaration order.
    pub rules: Vec<RuleConfig>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            container: String::new(),
            interval: Duration::from_secs(24 * 3600), // daily
            run_on_start: false,
            max_concurrency: 8,
            dry_run: false,
            rules: default_rules(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Serve the upload/listing HTTP endpoints.
    pub enabled: bool,
    /// Address to bind the HTTP listener to.
    pub bind: String,
    /// Public base URL used to build object links in listings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: String::from("0.0.0.0:3000"),
            public_base_url: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Configuration {
    /// Object storage configuration
    pub storage: StorageConfig,
    /// Tiering job configuration
    pub lifecycle: LifecycleConfig,
    /// HTTP upload/listing endpoints
    pub gateway: GatewayConfig,
}

impl Configuration {
    /// Load from defaults, `blobtier.toml` in the working directory and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::extract(Self::figment(Path::new(DEFAULT_CONFIG_FILE)))
    }

    /// Load from defaults, the given TOML file and the environment.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        Self::extract(Self::figment(path))
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        figment.extract().map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// Check that every setting required at start-up is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.dsn.trim().is_empty() {
            return Err(ConfigError::MissingSetting("storage.dsn"));
        }

        if self.lifecycle.container.trim().is_empty() {
            return Err(ConfigError::MissingSetting("lifecycle.container"));
        }

        let container = &self.lifecycle.container;
        if container.starts_with('/') || container.ends_with('/') {
            return Err(ConfigError::InvalidSetting {
                key: "lifecycle.container",
                message: format!("'{container}' must not start or end with '/'"),
            });
        }

        if self.lifecycle.max_concurrency == 0 {
            return Err(ConfigError::InvalidSetting {
                key: "lifecycle.max_concurrency",
                message: "must be at least 1".to_string(),
            });
        }

        if self.lifecycle.interval.is_zero() {
            return Err(ConfigError::InvalidSetting {
                key: "lifecycle.interval",
                message: "must be positive".to_string(),
            });
        }

        if self.lifecycle.interval > MAX_INTERVAL {
            return Err(ConfigError::InvalidSetting {
                key: "lifecycle.interval",
                message: format!(
                    "must not exceed {}",
                    humantime::format_duration(MAX_INTERVAL)
                ),
            });
        }

        if self.gateway.enabled && self.gateway.bind.trim().is_empty() {
            return Err(ConfigError::MissingSetting("gateway.bind"));
        }

        Ok(())
    }
}

/// Errors raised while loading or validating configuration. All are fatal at start-up.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(Box<figment::Error>),

    #[error("Missing required setting: {0}")]
    MissingSetting(&'static str),

    #[error("Invalid setting {key}: {message}")]
    InvalidSetting { key: &'static str, message: String },
}
