//! # Kanto Server
//!
//! Composition root and HTTP host for the Kanto framework.
//!
//! - [`Router`] - groups routes under a base path with their own middleware
//! - [`App`] - compiles routes, dispatches requests, owns the container lifecycle
//! - [`ShutdownSignal`] - idempotent, clonable shutdown trigger
//! - [`ServerConfig`] - bind host, drain timeout and body limits
//!
//! ## Example
//!
//! ```rust,no_run
//! use kanto_core::{Context, ContainerBuilder};
//! use kanto_server::{App, Router};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let container = ContainerBuilder::new()
//!         .register("greeting", |_| Ok(String::from("hello")))?
//!         .build();
//!
//!     let api = Router::new("/api").get("/hello/:name", |ctx: Context| async move {
//!         let greeting = ctx.services().get::<String>("greeting")?;
//!         let name = ctx.params().get("name").unwrap_or("trainer");
//!         Ok(ctx.text(format!("{greeting}, {name}")))
//!     });
//!
//!     let mut app = App::new().with_container(container);
//!     app.routes(api)?;
//!     app.listen(8080, |addr| println!("listening on {addr}")).await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/kanto-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod app;
pub mod config;
mod error;
pub mod router;
mod server;
pub mod shutdown;

pub use app::App;
pub use config::{ServerConfig, ServerConfigBuilder};
pub use error::{RouteError, ServerError};
pub use router::{Route, Router};
pub use shutdown::{ConnectionTracker, ShutdownSignal};
