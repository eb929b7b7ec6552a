//! Server error types.

use kanto_core::ContainerError;
use kanto_router::PatternError;
use thiserror::Error;

/// A route could not be registered.
#[derive(Debug, Error)]
#[error("invalid route {method} {path}")]
pub struct RouteError {
    /// The route method.
    pub method: http::Method,
    /// The full route path.
    pub path: String,
    /// Why the template was rejected.
    #[source]
    pub source: PatternError,
}

/// Errors raised while starting, serving or stopping an application.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}")]
    Bind {
        /// The requested address.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// I/O error during server operation.
    #[error("server I/O error")]
    Io(#[from] std::io::Error),

    /// A container start or stop failed.
    #[error("service container failed")]
    Container(#[from] ContainerError),
}
