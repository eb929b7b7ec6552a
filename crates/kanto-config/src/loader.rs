//! Layered configuration loader.

use std::env;
use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::{ConfigError, KantoConfig, LogFormat};

/// Builds a [`KantoConfig`] from defaults, files and the environment.
///
/// Files are merged key by key onto the current value, so a file that only
/// sets `server.port` keeps every other default. Environment overrides are
/// applied last, at [`load`](Self::load).
///
/// # Example
///
/// ```
/// use kanto_config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_development()
///     .with_string("[server]\nport = 3000", "toml")
///     .unwrap()
///     .load()
///     .unwrap();
///
/// assert_eq!(config.server.port, 3000);
/// assert_eq!(config.logging.level, "debug");
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: KantoConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader starting from [`KantoConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: KantoConfig::default(),
            env_prefix: None,
        }
    }

    /// Resets to the default values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = KantoConfig::default();
        self
    }

    /// Resets to the development preset.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = KantoConfig::development();
        self
    }

    /// Resets to the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = KantoConfig::production();
        self
    }

    /// Merges a `.toml` or `.json` file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file is missing, unreadable, has an
    /// unsupported extension, or does not fit the schema.
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        self.with_string(&content, format)
    }

    /// Merges a file if it exists.
    ///
    /// # Errors
    ///
    /// Same as [`with_file`](Self::with_file) when the file exists.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Merges configuration text in `format` (`toml` or `json`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on syntax errors, unknown fields or an
    /// unsupported format.
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let layer: Value = match format.to_ascii_lowercase().as_str() {
            "toml" => {
                let table: toml::Table = toml::from_str(content)?;
                serde_json::to_value(table)?
            }
            "json" => serde_json::from_str(content)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        self.merge(layer)?;
        Ok(self)
    }

    /// Enables `PREFIX__SECTION__FIELD` environment overrides.
    ///
    /// With prefix `KANTO`, `KANTO__SERVER__PORT=9000` sets `server.port`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_ascii_uppercase());
        self
    }

    /// Loads `.env` from the working directory into the process
    /// environment, if present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DotenvError`] if the file exists but cannot be
    /// parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(e.into()),
        }
    }

    /// Applies environment overrides and validates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an override does not parse or validation
    /// fails.
    pub fn load(mut self) -> Result<KantoConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_vars(&prefix, env::vars())?;
        }
        self.config.validate()?;
        Ok(self.config)
    }

    /// Returns the configuration without environment overrides or
    /// validation.
    #[must_use]
    pub fn load_unvalidated(self) -> KantoConfig {
        self.config
    }

    fn merge(&mut self, layer: Value) -> Result<(), ConfigError> {
        let mut merged = serde_json::to_value(&self.config)?;
        merge_values(&mut merged, layer);
        self.config =
            serde_json::from_value(merged).map_err(|e| ConfigError::SchemaError(e.to_string()))?;
        Ok(())
    }

    fn apply_env_vars<I>(&mut self, prefix: &str, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let marker = format!("{prefix}__");
        for (key, value) in vars {
            if let Some(path) = key.strip_prefix(&marker) {
                self.apply_env_var(&key, path, &value)?;
            }
        }
        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, path: &str, value: &str) -> Result<(), ConfigError> {
        let parts: Vec<&str> = path.split("__").collect();
        match parts.as_slice() {
            ["SERVER", "HOST"] => self.config.server.host = value.to_string(),
            ["SERVER", "PORT"] => self.config.server.port = parse_number(key, value)?,
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                self.config.server.shutdown_timeout_secs = parse_number(key, value)?;
            }
            ["SERVER", "MAX_BODY_BYTES"] => {
                self.config.server.max_body_bytes = parse_number(key, value)?;
            }
            ["SERVER", "KEEP_ALIVE"] => self.config.server.keep_alive = parse_flag(key, value)?,

            ["LOGGING", "ENABLED"] => self.config.logging.enabled = parse_flag(key, value)?,
            ["LOGGING", "LEVEL"] => self.config.logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                self.config.logging.format = match value.to_ascii_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["LOGGING", "SERVICE_NAME"] => self.config.logging.service_name = value.to_string(),
            ["LOGGING", "FILE_LINE_INFO"] => {
                self.config.logging.file_line_info = parse_flag(key, value)?;
            }

            ["METRICS", "ENABLED"] => self.config.metrics.enabled = parse_flag(key, value)?,
            ["METRICS", "LISTEN_ADDR"] => {
                self.config.metrics.listen_addr =
                    (!value.is_empty()).then(|| value.to_string());
            }
            ["METRICS", "PATH"] => self.config.metrics.path = value.to_string(),

            _ => return Err(ConfigError::env_parse_error(key, "unknown configuration key")),
        }
        Ok(())
    }
}

fn merge_values(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(slot) => merge_values(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, layer) => *slot = layer,
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected a non-negative integer"))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::env_parse_error(key, "expected boolean")),
    }
}
