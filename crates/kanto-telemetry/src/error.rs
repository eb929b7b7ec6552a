//! Telemetry error types.

use thiserror::Error;

/// Errors raised while installing logging or metrics.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The metrics recorder could not be installed.
    #[error("failed to initialize metrics: {0}")]
    MetricsInit(String),

    /// The log subscriber could not be installed.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),

    /// A listen address did not parse.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}
