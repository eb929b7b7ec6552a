//! Handler contract and shared request/response types.
//!
//! A [`Handler`] is the terminal step of a request: it receives the
//! [`Context`] and produces a [`Response`] or a [`KantoError`].

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use crate::context::Context;
use crate::error::KantoResult;

/// HTTP request with a fully buffered body.
pub type Request = http::Request<Bytes>;

/// HTTP response with a fully buffered body.
pub type Response = http::Response<Bytes>;

/// A boxed future, as used by handlers and middleware.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Terminal request handler.
///
/// Any `Fn(Context) -> impl Future<Output = KantoResult<Response>>` closure
/// or function is a handler.
///
/// # Example
///
/// ```
/// use kanto_core::{Context, Handler, KantoResult, Response};
///
/// async fn get_card(ctx: Context) -> KantoResult<Response> {
///     let id = ctx.params().get("id").unwrap_or_default().to_string();
///     ctx.json(&serde_json::json!({ "id": id }))
/// }
///
/// fn assert_handler<H: Handler>(_: H) {}
/// assert_handler(get_card);
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Handles the request.
    fn call(&self, ctx: Context) -> BoxFuture<'static, KantoResult<Response>>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = KantoResult<Response>> + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture<'static, KantoResult<Response>> {
        Box::pin(self(ctx))
    }
}
