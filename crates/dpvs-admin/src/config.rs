//! Configuration loading and validation for dpvsadm

use dpvs::{DEFAULT_SOCKET, EngineEndpoint};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] ValidationErrors),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationErrors> {
        self.engine.validate()?;
        self.logging.validate()?;

        if self.engine.transport == TransportKind::Tcp && self.engine.address.is_none() {
            let mut errors = ValidationErrors::new();
            errors.add("address", ValidationError::new("tcp_address_required"));
            return Err(errors);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Unix,
    Tcp,
}

/// How to reach the engine
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EngineSettings {
    pub transport: TransportKind,

    #[validate(length(min = 1), custom = "validate_socket_path")]
    pub socket: String,

    /// `host:port`, used when `transport` is `tcp`
    #[validate(custom = "validate_tcp_address")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggingSettings {
    #[validate(custom = "validate_log_level")]
    pub level: String,

    pub format: LogFormat,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            transport: TransportKind::Unix,
            socket: DEFAULT_SOCKET.to_string(),
            address: None,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Text,
        }
    }
}

// Custom validators

fn validate_socket_path(path: &str) -> Result<(), ValidationError> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("socket_path_empty"));
    }

    // Must be absolute path or relative (starting with ./)
    if !trimmed.starts_with('/') && !trimmed.starts_with("./") {
        return Err(ValidationError::new("socket_path_invalid_format"));
    }

    Ok(())
}

fn validate_tcp_address(address: &str) -> Result<(), ValidationError> {
    match address.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(()),
        _ => Err(ValidationError::new("tcp_address_invalid_format")),
    }
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level {
        "trace" | "debug" | "info" | "warn" | "error" | "off" => Ok(()),
        _ => Err(ValidationError::new("log_level_unknown")),
    }
}

// Configuration loading implementation

impl Config {
    /// Load configuration from default search paths
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => {
                tracing::debug!("Loading configuration from: {}", path.display());
                Self::load_from_file(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/dpvs/dpvsadm.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./dpvsadm.yaml"));

        paths.into_iter().find(|p| p.is_file())
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/dpvs/dpvsadm.yaml"))
    }

    /// The engine endpoint this configuration selects.
    pub fn endpoint(&self) -> EngineEndpoint {
        match (&self.engine.transport, &self.engine.address) {
            (TransportKind::Tcp, Some(address)) => EngineEndpoint::Tcp(address.clone()),
            _ => EngineEndpoint::Unix(PathBuf::from(&self.engine.socket)),
        }
    }

    /// Apply `--socket` / `--tcp` overrides.
    pub fn override_engine(&mut self, socket: Option<&Path>, tcp: Option<&str>) {
        if let Some(socket) = socket {
            self.engine.transport = TransportKind::Unix;
            self.engine.socket = socket.display().to_string();
        }
        if let Some(tcp) = tcp {
            self.engine.transport = TransportKind::Tcp;
            self.engine.address = Some(tcp.to_string());
        }
    }
}
