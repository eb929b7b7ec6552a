//! Configuration schema.

use std::net::SocketAddr;
use std::time::Duration;

use kanto_server::ServerConfig;
use kanto_telemetry::{LogConfig, MetricsConfig};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Complete service configuration.
///
/// ```
/// use kanto_config::KantoConfig;
///
/// let config = KantoConfig::default();
/// assert_eq!(config.server.port, 8080);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct KantoConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerSettings,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Metrics settings.
    #[serde(default)]
    pub metrics: MetricsSettings,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    /// Bind host.
    pub host: String,

    /// Listen port; `0` picks a free port.
    pub port: u16,

    /// Drain timeout in seconds.
    pub shutdown_timeout_secs: u64,

    /// Largest accepted request body in bytes.
    pub max_body_bytes: usize,

    /// HTTP/1.1 keep-alive.
    pub keep_alive: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        Self {
            host: defaults.host().to_string(),
            port: defaults.port(),
            shutdown_timeout_secs: defaults.shutdown_timeout().as_secs(),
            max_body_bytes: defaults.max_body_bytes(),
            keep_alive: defaults.keep_alive(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Multi-line human-readable output.
    Pretty,
}

/// `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// Whether logging is installed.
    pub enabled: bool,

    /// Filter directives.
    pub level: String,

    /// Output format.
    pub format: LogFormat,

    /// Service name logged at startup.
    pub service_name: String,

    /// Include file and line.
    pub file_line_info: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self::from(&LogConfig::production())
    }
}

impl From<&LogConfig> for LoggingSettings {
    fn from(config: &LogConfig) -> Self {
        Self {
            enabled: config.enabled,
            level: config.level.clone(),
            format: if config.json_format {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            },
            service_name: config.service_name.clone(),
            file_line_info: config.file_line_info,
        }
    }
}

/// `[metrics]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsSettings {
    /// Whether the Prometheus recorder is installed.
    pub enabled: bool,

    /// Separate scrape listener address; unset serves on the app.
    pub listen_addr: Option<String>,

    /// Scrape route on the application.
    pub path: String,

    /// Request duration buckets in seconds.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        let defaults = MetricsConfig::default();
        Self {
            enabled: defaults.enabled,
            listen_addr: defaults.listen_addr,
            path: defaults.path,
            duration_buckets: defaults.duration_buckets,
        }
    }
}

impl KantoConfig {
    /// Pretty debug logging.
    #[must_use]
    pub fn development() -> Self {
        Self {
            logging: LoggingSettings::from(&LogConfig::development()),
            ..Self::default()
        }
    }

    /// JSON info logging.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }

    /// Checks values that deserialize fine but cannot work.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::invalid_value("server.host", "must not be empty"));
        }
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "server.max_body_bytes",
                "must be greater than zero",
            ));
        }

        if self.logging.enabled {
            kanto_telemetry::logging::create_env_filter(&self.logging.level)
                .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))?;
        }

        if self.metrics.enabled {
            if let Some(addr) = &self.metrics.listen_addr {
                addr.parse::<SocketAddr>().map_err(|_| {
                    ConfigError::invalid_value(
                        "metrics.listen_addr",
                        format!("invalid socket address: {addr}"),
                    )
                })?;
            }
            if !self.metrics.path.starts_with('/') {
                return Err(ConfigError::invalid_value(
                    "metrics.path",
                    "must start with '/'",
                ));
            }
            if self.metrics.duration_buckets.is_empty() {
                return Err(ConfigError::invalid_value(
                    "metrics.duration_buckets",
                    "must not be empty",
                ));
            }
        }

        Ok(())
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        ServerConfig::builder()
            .host(settings.host.clone())
            .port(settings.port)
            .shutdown_timeout(Duration::from_secs(settings.shutdown_timeout_secs))
            .max_body_bytes(settings.max_body_bytes)
            .keep_alive(settings.keep_alive)
            .build()
    }
}

impl From<&LoggingSettings> for LogConfig {
    fn from(settings: &LoggingSettings) -> Self {
        let base = match settings.format {
            LogFormat::Json => LogConfig::production(),
            LogFormat::Pretty => LogConfig::development(),
        };
        LogConfig {
            enabled: settings.enabled,
            level: settings.level.clone(),
            file_line_info: settings.file_line_info,
            service_name: settings.service_name.clone(),
            ..base
        }
    }
}

impl From<&MetricsSettings> for MetricsConfig {
    fn from(settings: &MetricsSettings) -> Self {
        MetricsConfig {
            enabled: settings.enabled,
            listen_addr: settings.listen_addr.clone(),
            path: settings.path.clone(),
            duration_buckets: settings.duration_buckets.clone(),
        }
    }
}
