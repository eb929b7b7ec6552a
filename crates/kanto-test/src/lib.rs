//! # Kanto Test
//!
//! Drives a Kanto [`App`](kanto_server::App) in memory: requests go
//! through global middleware, router middleware and handlers exactly as
//! they would over a socket, without binding a port.
//!
//! ```rust
//! use kanto_core::Context;
//! use kanto_server::{App, Router};
//! use kanto_test::TestClient;
//!
//! # tokio_test::block_on(async {
//! let mut app = App::new();
//! app.routes(Router::new("/cards").post("/", |ctx: Context| async move {
//!     let card: serde_json::Value = ctx.json_body()?;
//!     ctx.json_with_status(http::StatusCode::CREATED, &card)
//! }))
//! .unwrap();
//!
//! let client = TestClient::new(app);
//! let response = client
//!     .post("/cards")
//!     .json(&serde_json::json!({ "name": "Pikachu" }))
//!     .send()
//!     .await;
//!
//! response.assert_status(http::StatusCode::CREATED);
//! assert_eq!(response.json_value().unwrap()["name"], "Pikachu");
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/kanto-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod response;

pub use client::{TestClient, TestRequest};
pub use error::TestError;
pub use response::TestResponse;
