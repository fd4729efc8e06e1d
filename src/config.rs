//! Configuration Management
//!
//! Handles the persistent configuration file for awsf and turns it into the
//! immutable [`ServiceConfig`] that one refresh runs against.

use crate::aws::retry::RetryPolicy;
use crate::resource::model::Service;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_REGION: &str = "us-east-1";
const MAX_DESCRIBE_CONCURRENCY: usize = 16;

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unknown service '{0}' (expected one of: lambda, s3, sqs, kinesis, dynamodb, rds, apigateway)")]
    UnknownService(String),
    #[error("no services enabled")]
    NoServicesEnabled,
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("no console URL template for {service} '{key}'")]
    MissingTemplate { service: Service, key: String },
    #[error("invalid console URL template for {service} '{key}': {reason}")]
    InvalidTemplate {
        service: Service,
        key: String,
        reason: String,
    },
}

/// User configuration, as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_enabled_services")]
    pub enabled_services: Vec<String>,
    #[serde(default = "default_region")]
    pub aws_region: String,
    #[serde(default)]
    pub aws_profile: Option<String>,
    #[serde(default = "default_service_timeout_secs")]
    pub service_timeout_secs: u64,
    #[serde(default = "default_refresh_timeout_secs")]
    pub refresh_timeout_secs: u64,
    #[serde(default = "default_describe_concurrency")]
    pub describe_concurrency: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_index_max_age_hours")]
    pub index_max_age_hours: u64,
    /// Overrides the default index location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_path: Option<PathBuf>,
}

fn default_enabled_services() -> Vec<String> {
    Service::ALL.iter().map(|s| s.to_string()).collect()
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_service_timeout_secs() -> u64 {
    120
}

/// Must stay below the per-service budget
fn default_refresh_timeout_secs() -> u64 {
    90
}

fn default_describe_concurrency() -> usize {
    8
}

fn default_max_attempts() -> u32 {
    3
}

fn default_index_max_age_hours() -> u64 {
    24
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled_services: default_enabled_services(),
            aws_region: default_region(),
            aws_profile: None,
            service_timeout_secs: default_service_timeout_secs(),
            refresh_timeout_secs: default_refresh_timeout_secs(),
            describe_concurrency: default_describe_concurrency(),
            max_attempts: default_max_attempts(),
            index_max_age_hours: default_index_max_age_hours(),
            index_path: None,
        }
    }
}

/// Immutable settings for one aggregation run
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Services to query, in index order, without duplicates
    pub enabled_services: Vec<Service>,
    pub aws_region: String,
    pub aws_profile: Option<String>,
    /// Budget for one service adapter
    pub service_timeout: Duration,
    /// Budget for the whole run; in-flight services are cancelled after it
    pub refresh_timeout: Duration,
    /// Concurrent describe calls within one service
    pub describe_concurrency: usize,
    pub retry: RetryPolicy,
}

impl ServiceConfig {
    /// Config for the given services with default timeouts
    pub fn new(enabled_services: Vec<Service>, aws_region: &str) -> Self {
        Self {
            enabled_services,
            aws_region: aws_region.to_string(),
            aws_profile: None,
            service_timeout: Duration::from_secs(default_service_timeout_secs()),
            refresh_timeout: Duration::from_secs(default_refresh_timeout_secs()),
            describe_concurrency: default_describe_concurrency(),
            retry: RetryPolicy::new(default_max_attempts()),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("awsf").join("config.json"))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from disk. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save configuration to disk
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let content = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: std::io::Error::other(e),
        })?;
        std::fs::write(path, content).map_err(write_err)
    }

    /// Parse and de-duplicate the enabled services
    pub fn enabled(&self) -> Result<Vec<Service>, ConfigError> {
        let mut services: Vec<Service> = Vec::new();
        for name in &self.enabled_services {
            let service: Service = name
                .parse()
                .map_err(|_| ConfigError::UnknownService(name.clone()))?;
            if !services.contains(&service) {
                services.push(service);
            }
        }

        if services.is_empty() {
            return Err(ConfigError::NoServicesEnabled);
        }
        Ok(services)
    }

    /// Build the run configuration (CLI > config file > defaults)
    pub fn service_config(
        &self,
        region_override: Option<&str>,
        profile_override: Option<&str>,
    ) -> Result<ServiceConfig, ConfigError> {
        let enabled_services = self.enabled()?;

        let aws_region = region_override
            .unwrap_or(&self.aws_region)
            .trim()
            .to_string();
        if aws_region.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "aws_region",
                reason: "must not be empty".to_string(),
            });
        }

        let aws_profile = profile_override
            .map(|p| p.to_string())
            .or_else(|| self.aws_profile.clone())
            .filter(|p| !p.trim().is_empty());

        if self.service_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "service_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.refresh_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "refresh_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.refresh_timeout_secs >= self.service_timeout_secs {
            return Err(ConfigError::InvalidValue {
                field: "refresh_timeout_secs",
                reason: format!(
                    "must be shorter than service_timeout_secs ({})",
                    self.service_timeout_secs
                ),
            });
        }

        Ok(ServiceConfig {
            enabled_services,
            aws_region,
            aws_profile,
            service_timeout: Duration::from_secs(self.service_timeout_secs),
            refresh_timeout: Duration::from_secs(self.refresh_timeout_secs),
            describe_concurrency: self.describe_concurrency.clamp(1, MAX_DESCRIBE_CONCURRENCY),
            retry: RetryPolicy::new(self.max_attempts),
        })
    }

    /// Maximum index age before search warns about it
    pub fn index_max_age(&self) -> Duration {
        Duration::from_secs(self.index_max_age_hours.saturating_mul(3600))
    }

    pub fn is_enabled(&self, service: Service) -> bool {
        self.enabled_services
            .iter()
            .any(|name| name.parse::<Service>() == Ok(service))
    }

    /// Enable a service (no-op if already enabled)
    pub fn enable(&mut self, service: Service) {
        if !self.is_enabled(service) {
            self.enabled_services.push(service.to_string());
        }
    }

    /// Enable every service, in canonical order
    pub fn enable_all(&mut self) {
        self.enabled_services = default_enabled_services();
    }

    /// Disable a service. At least one service must stay enabled.
    pub fn disable(&mut self, service: Service) -> Result<(), ConfigError> {
        let remaining: Vec<String> = self
            .enabled_services
            .iter()
            .filter(|name| name.parse::<Service>() != Ok(service))
            .cloned()
            .collect();

        if remaining.is_empty() {
            return Err(ConfigError::NoServicesEnabled);
        }
        self.enabled_services = remaining;
        Ok(())
    }

    /// Set the region
    pub fn set_region(&mut self, region: &str) -> Result<(), ConfigError> {
        let region = region.trim();
        if region.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "aws_region",
                reason: "must not be empty".to_string(),
            });
        }
        self.aws_region = region.to_string();
        Ok(())
    }

    /// Set or clear the profile
    pub fn set_profile(&mut self, profile: Option<&str>) {
        self.aws_profile = profile
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
    }
}
