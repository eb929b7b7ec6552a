//! # Kanto Middleware
//!
//! Onion-model middleware for the Kanto framework.
//!
//! Every middleware receives the request [`Context`](kanto_core::Context) and
//! a [`Next`] continuation. Calling [`Next::run`] hands control to the rest
//! of the chain and yields its response; not calling it short-circuits.
//!
//! ```text
//! Request → global[0] → global[1] → router[0] → Handler
//!                                                  ↓
//! Response ← global[0] ← global[1] ← router[0] ←──┘
//! ```
//!
//! The Nth registered middleware is the Nth layer from the outside.
//!
//! ## Stages
//!
//! [`stages`] holds reusable middleware:
//!
//! | Stage                        | Purpose                                    |
//! |------------------------------|--------------------------------------------|
//! | [`stages::RequestLogger`]    | Structured request log and HTTP metrics    |
//! | [`stages::Cors`]             | CORS headers, preflight short-circuit      |
//! | [`stages::RateLimit`]        | Fixed-window rate limiting per client      |
//! | [`stages::CircuitBreaker`]   | Fail fast while downstream keeps failing   |
//!
//! ## Example
//!
//! ```
//! use kanto_middleware::{FnMiddleware, Middleware};
//!
//! let timing = FnMiddleware::new("timing", |ctx, next| async move {
//!     let response = next.run(ctx.clone()).await;
//!     tracing::debug!(elapsed_ms = ctx.elapsed().as_millis() as u64, "done");
//!     response
//! });
//! assert_eq!(timing.name(), "timing");
//! ```

#![doc(html_root_url = "https://docs.rs/kanto-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod middleware;
pub mod pipeline;
pub mod stages;

pub use kanto_core::BoxFuture;
pub use middleware::{BoxedMiddleware, FnMiddleware, Middleware, Next};
pub use pipeline::Pipeline;
