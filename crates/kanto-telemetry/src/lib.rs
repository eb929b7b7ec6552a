//! Logging and metrics setup for Kanto services.
//!
//! - [`logging`] installs a `tracing-subscriber` stack with JSON or pretty output
//! - [`metrics`] installs the Prometheus recorder and exposes a scrape handler
//!
//! Both are process-global and meant to be called once from `main`.
//!
//! ```rust,no_run
//! use kanto_telemetry::{init_logging, init_metrics, LogConfig, MetricsConfig};
//!
//! init_logging(&LogConfig::production().with_service_name("card-api"))?;
//! init_metrics(&MetricsConfig::default())?;
//! # Ok::<(), kanto_telemetry::TelemetryError>(())
//! ```

#![doc(html_root_url = "https://docs.rs/kanto-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};
pub use metrics::{init_metrics, render_metrics, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
