//! # Kanto Core
//!
//! Core types and traits for the Kanto microservice framework.
//!
//! This crate provides the foundational types used throughout Kanto:
//!
//! - [`Context`] - Immutable per-request context with response helpers
//! - [`RequestId`] - Correlation identifier, reused from `x-request-id` or UUID v7
//! - [`Query`] - Typed accessors over the query string
//! - [`KantoError`] - Request-time error taxonomy and JSON envelope
//! - [`Handler`] - Terminal request handler contract
//! - [`di`] - Named dependency container with ordered lifecycle hooks

#![doc(html_root_url = "https://docs.rs/kanto-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
pub mod di;
mod error;
mod handler;
mod query;
pub mod response;

pub use context::{Context, RequestId, REQUEST_ID_HEADER};
pub use di::{
    Container, ContainerBuilder, ContainerError, ContainerState, Lifecycle, ServiceKey,
    ServiceLifetime, Services,
};
pub use error::{ErrorCategory, ErrorDetail, ErrorEnvelope, KantoError, KantoResult};
pub use handler::{BoxFuture, Handler, Request, Response};
pub use kanto_router::Params;
pub use query::Query;
