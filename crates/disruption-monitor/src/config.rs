//! Configuration loading and validation for the disruption monitor

use disruption::{BackendSamplerBuilder, ConnectionType, StaticHost, TlsConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] ValidationErrors),

    #[error("Invalid backend: {0}")]
    Sampler(#[from] common::Error),

    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sampler: SamplerSettings,

    #[serde(default)]
    pub backends: Vec<BackendConfig>,

    #[serde(default)]
    pub output: OutputSettings,

    #[serde(default)]
    pub metrics: MetricsSettings,

    #[serde(default)]
    pub capture: Option<CaptureSettings>,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationErrors> {
        self.sampler.validate()?;
        self.metrics.validate()?;
        if let Some(capture) = &self.capture {
            capture.validate()?;
        }

        let mut seen = HashSet::new();
        for backend in &self.backends {
            backend.validate()?;
            if !seen.insert(backend.name.as_str()) {
                let mut errors = ValidationErrors::new();
                errors.add("backends", ValidationError::new("duplicate_backend_name"));
                return Err(errors);
            }
        }
        Ok(())
    }
}

/// Sampling cadence shared by every backend
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SamplerSettings {
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_sample_interval")]
    pub interval: Duration,
}

/// Which flavour of backend is probed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Any HTTP server
    #[default]
    Simple,
    /// A kube-like API server, recorded per connection type
    ApiServer,
    /// A backend behind a named route
    Route,
}

/// One backend to sample
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BackendConfig {
    #[validate(length(min = 1))]
    pub name: String,

    #[serde(default)]
    pub kind: BackendKind,

    /// Scheme and authority, e.g. `https://api.example.com:6443`
    #[validate(custom = "validate_url")]
    pub url: String,

    #[validate(custom = "validate_path")]
    pub path: String,

    #[serde(default = "default_connection_types")]
    #[validate(length(min = 1))]
    pub connection_types: Vec<ConnectionType>,

    #[serde(default, with = "humantime_serde")]
    #[validate(custom = "validate_timeout")]
    pub timeout: Option<Duration>,

    #[serde(default)]
    pub expected_status: Option<u16>,

    #[serde(default)]
    pub expected_body: Option<String>,

    #[serde(default)]
    pub expected_body_regex: Option<String>,

    #[serde(default)]
    pub user_agent: Option<String>,

    #[serde(default)]
    pub bearer_token: Option<String>,

    #[serde(default)]
    pub bearer_token_file: Option<PathBuf>,

    /// PEM bundle of trusted CAs
    #[serde(default)]
    pub ca_file: Option<PathBuf>,

    /// PEM client certificate and key
    #[serde(default)]
    pub client_identity_file: Option<PathBuf>,

    #[serde(default)]
    pub insecure_skip_verify: bool,

    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub route: Option<String>,

    #[serde(default)]
    pub load_balancer: Option<String>,
}

/// Where the report goes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Report file; printed to stdout when unset
    pub report_path: Option<PathBuf>,
}

/// Prometheus endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MetricsSettings {
    pub enabled: bool,

    #[validate(length(min = 1))]
    pub listen_addr: String,
}

/// Command run when a disruption begins
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CaptureSettings {
    #[validate(length(min = 1))]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_capture_duration")]
    pub duration: Duration,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub format: Option<String>,
}

// Default implementations

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1:9464".to_string(),
        }
    }
}

fn default_connection_types() -> Vec<ConnectionType> {
    vec![ConnectionType::New, ConnectionType::Reused]
}

// Custom validators

fn validate_sample_interval(interval: &Duration) -> Result<(), ValidationError> {
    let millis = interval.as_millis();
    if !(10..=60_000).contains(&millis) {
        return Err(ValidationError::new("sample_interval_out_of_range"));
    }
    Ok(())
}

fn validate_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    if timeout.is_zero() || *timeout > Duration::from_secs(300) {
        return Err(ValidationError::new("timeout_out_of_range"));
    }
    Ok(())
}

fn validate_capture_duration(duration: &Duration) -> Result<(), ValidationError> {
    if duration.is_zero() || *duration > Duration::from_secs(600) {
        return Err(ValidationError::new("capture_duration_out_of_range"));
    }
    Ok(())
}

fn validate_url(url: &str) -> Result<(), ValidationError> {
    let trimmed = url.trim();
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(ValidationError::new("url_scheme_invalid"));
    }
    if trimmed.ends_with('/') {
        return Err(ValidationError::new("url_trailing_slash"));
    }
    Ok(())
}

fn validate_path(path: &str) -> Result<(), ValidationError> {
    if !path.starts_with('/') {
        return Err(ValidationError::new("path_not_absolute"));
    }
    Ok(())
}

// Configuration loading implementation

impl Config {
    /// Load configuration from default search paths
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(&path)
            }
            None => {
                tracing::info!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/disruption/monitor.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./disruption-monitor.yaml"));

        paths.into_iter().find(|p: &PathBuf| p.exists() && p.is_file())
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/disruption/monitor.yaml"))
    }
}

impl BackendConfig {
    /// Sampler builder for one connection type, with everything but hooks applied.
    pub fn sampler_builder(
        &self,
        connection_type: ConnectionType,
        sample_interval: Duration,
    ) -> Result<BackendSamplerBuilder, ConfigError> {
        let mut builder = match self.kind {
            BackendKind::Simple => {
                BackendSamplerBuilder::simple(self.url.as_str(), &self.name, self.path.as_str(), connection_type)
            }
            BackendKind::ApiServer => {
                BackendSamplerBuilder::api_server(self.url.as_str(), &self.name, self.path.as_str(), connection_type)
            }
            BackendKind::Route => {
                let (Some(namespace), Some(route)) = (&self.namespace, &self.route) else {
                    let mut errors = ValidationErrors::new();
                    errors.add("route", ValidationError::new("route_backend_requires_namespace_and_route"));
                    return Err(errors.into());
                };
                BackendSamplerBuilder::route(
                    Arc::new(StaticHost::new(self.url.as_str())),
                    namespace,
                    route,
                    &self.name,
                    self.path.as_str(),
                    connection_type,
                )
            }
        };

        builder = builder.sample_interval(sample_interval);
        if let Some(load_balancer) = &self.load_balancer {
            builder = builder.load_balancer(load_balancer);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(status) = self.expected_status {
            builder = builder.expected_status_code(status);
        }
        if let Some(body) = &self.expected_body {
            builder = builder.expected_body(body.as_str());
        }
        if let Some(pattern) = &self.expected_body_regex {
            builder = builder.expected_body_regex(pattern.as_str());
        }
        if let Some(user_agent) = &self.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }
        if self.bearer_token.is_some() || self.bearer_token_file.is_some() {
            builder = builder.bearer_token_auth(self.bearer_token.clone(), self.bearer_token_file.clone());
        }
        if let Some(tls) = self.tls_config()? {
            builder = builder.tls_config(tls);
        }

        Ok(builder)
    }

    /// TLS settings, if any were configured.
    fn tls_config(&self) -> Result<Option<TlsConfig>, ConfigError> {
        if self.ca_file.is_none() && self.client_identity_file.is_none() && !self.insecure_skip_verify {
            return Ok(None);
        }
        Ok(Some(TlsConfig {
            ca_bundle_pem: self.ca_file.as_deref().map(read_pem).transpose()?,
            client_identity_pem: self.client_identity_file.as_deref().map(read_pem).transpose()?,
            insecure_skip_verify: self.insecure_skip_verify,
        }))
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, ConfigError> {
    std::fs::read(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })
}
