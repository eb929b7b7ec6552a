//! Reusable middleware stages.
//!
//! Stages are ordinary [`Middleware`](crate::Middleware) values; register
//! them globally with `App::use_middleware` or on a single router.
//!
//! - [`logger`] - request log line and HTTP metrics
//! - [`cors`] - CORS headers and preflight answers
//! - [`rate_limit`] - fixed-window limit per client
//! - [`circuit_breaker`] - 503 fallback while downstream keeps failing

pub mod circuit_breaker;
pub mod cors;
pub mod logger;
pub mod rate_limit;

pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use cors::{Cors, CorsBuilder};
pub use logger::RequestLogger;
pub use rate_limit::{RateLimit, RateLimitBuilder};
