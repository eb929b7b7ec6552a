//! # Kanto
//!
//! Minimal core for JSON microservices:
//!
//! - path templates compiled to matchers (`/cards/:id`)
//! - onion-model middleware, global and per router
//! - a named service container with ordered `start`/`stop` hooks
//! - an [`App`](server::App) tying them together behind hyper
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kanto::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let container = ContainerBuilder::new()
//!         .register("prefix", |_| Ok(String::from("card")))?
//!         .build();
//!
//!     let cards = Router::new("/cards")
//!         .use_middleware(RequestLogger::new())
//!         .get("/:id", |ctx: Context| async move {
//!             let prefix = ctx.services().get::<String>("prefix")?;
//!             let id = ctx.params().get("id").unwrap_or_default();
//!             ctx.json(&serde_json::json!({ "id": format!("{prefix}-{id}") }))
//!         });
//!
//!     let mut app = App::new().with_container(container);
//!     app.use_middleware(Cors::permissive());
//!     app.routes(cards)?;
//!     app.listen(8080, |addr| tracing::info!(%addr, "ready")).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Request flow
//!
//! ```text
//! request -> global middleware -> router middleware -> handler
//!                                                         |
//! response <- global middleware <- router middleware <----+
//! ```
//!
//! Errors returned anywhere in the chain become a JSON envelope:
//!
//! ```json
//! { "error": { "code": "NOT_FOUND", "message": "Not Found", "status": 404 } }
//! ```

#![doc(html_root_url = "https://docs.rs/kanto/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub use kanto_config as config;
pub use kanto_core as core;
pub use kanto_middleware as middleware;
pub use kanto_router as router;
pub use kanto_server as server;
pub use kanto_telemetry as telemetry;

/// Common imports.
///
/// ```rust
/// use kanto::prelude::*;
/// ```
pub mod prelude {
    pub use kanto_core::{
        Container, ContainerBuilder, ContainerError, Context, Handler, KantoError, KantoResult,
        Lifecycle, Params, Query, RequestId, Response, ServiceKey, Services,
    };

    pub use kanto_middleware::stages::{CircuitBreaker, Cors, RateLimit, RequestLogger};
    pub use kanto_middleware::{FnMiddleware, Middleware, Next};

    pub use kanto_server::{App, Router, ServerConfig, ShutdownSignal};

    pub use kanto_config::{ConfigLoader, KantoConfig};
    pub use kanto_telemetry::{init_logging, init_metrics, LogConfig, MetricsConfig};
}
