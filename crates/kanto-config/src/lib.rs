//! # Kanto Config
//!
//! Typed configuration for Kanto services, loaded in layers:
//!
//! 1. built-in defaults (or a development/production preset)
//! 2. a TOML or JSON file, merged key by key
//! 3. `PREFIX__SECTION__FIELD` environment variables
//!
//! The result converts into [`kanto_server::ServerConfig`],
//! [`kanto_telemetry::LogConfig`] and [`kanto_telemetry::MetricsConfig`].
//!
//! ```no_run
//! use kanto_config::ConfigLoader;
//!
//! # fn main() -> Result<(), kanto_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_dotenv()?
//!     .with_optional_file("kanto.toml")?
//!     .with_env_prefix("KANTO")
//!     .load()?;
//!
//! let server = kanto_server::ServerConfig::from(&config.server);
//! # let _ = server;
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/kanto-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;

pub use config::{KantoConfig, LogFormat, LoggingSettings, MetricsSettings, ServerSettings};
pub use error::ConfigError;
pub use loader::ConfigLoader;
