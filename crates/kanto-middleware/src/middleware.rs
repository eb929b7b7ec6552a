//! Core middleware trait and continuation.
//!
//! # Example
//!
//! ```
//! use kanto_core::{BoxFuture, Context, KantoResult, Response};
//! use kanto_middleware::{Middleware, Next};
//!
//! struct PoweredBy;
//!
//! impl Middleware for PoweredBy {
//!     fn name(&self) -> &'static str {
//!         "powered-by"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: Context,
//!         next: Next,
//!     ) -> BoxFuture<'a, KantoResult<Response>> {
//!         Box::pin(async move {
//!             let mut response = next.run(ctx).await?;
//!             response
//!                 .headers_mut()
//!                 .insert("x-powered-by", http::HeaderValue::from_static("kanto"));
//!             Ok(response)
//!         })
//!     }
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use kanto_core::{BoxFuture, Context, Handler, KantoResult, Response};

/// A type-erased middleware that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// The core middleware trait.
///
/// # Invariants
///
/// - `next.run()` is called at most once; `Next` is consumed by the call
/// - not calling `next.run()` short-circuits the rest of the chain
/// - errors may be returned instead of a response; the dispatcher turns them
///   into the JSON error envelope
pub trait Middleware: Send + Sync + 'static {
    /// Returns the name of this middleware, used in logs.
    fn name(&self) -> &'static str;

    /// Processes the request.
    fn process<'a>(&'a self, ctx: Context, next: Next) -> BoxFuture<'a, KantoResult<Response>>;
}

struct Chain {
    layers: Vec<BoxedMiddleware>,
    endpoint: Arc<dyn Handler>,
}

/// Continuation into the rest of the chain.
///
/// Owns its position in the chain, so a middleware can move it into a
/// spawned or boxed future freely.
pub struct Next {
    chain: Arc<Chain>,
    index: usize,
}

impl Next {
    /// Creates a continuation positioned before the first layer.
    pub(crate) fn start(layers: Vec<BoxedMiddleware>, endpoint: Arc<dyn Handler>) -> Self {
        Self {
            chain: Arc::new(Chain { layers, endpoint }),
            index: 0,
        }
    }

    /// Invokes the next middleware, or the handler at the end of the chain.
    ///
    /// This consumes `self` so the rest of the chain runs at most once.
    pub fn run(self, ctx: Context) -> BoxFuture<'static, KantoResult<Response>> {
        match self.chain.layers.get(self.index).cloned() {
            Some(layer) => {
                let next = Self {
                    chain: self.chain,
                    index: self.index + 1,
                };
                Box::pin(async move { layer.process(ctx, next).await })
            }
            None => self.chain.endpoint.call(ctx),
        }
    }

    /// Returns how many middleware layers are still ahead.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.chain.layers.len().saturating_sub(self.index)
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.remaining())
            .finish()
    }
}

/// A middleware built from an async closure.
///
/// # Example
///
/// ```
/// use kanto_middleware::FnMiddleware;
///
/// let auth = FnMiddleware::new("api-key", |ctx, next| async move {
///     match ctx.header("x-api-key") {
///         Some(_) => next.run(ctx).await,
///         None => Err(kanto_core::KantoError::unauthorized("missing api key")),
///     }
/// });
/// ```
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

impl<F> FnMiddleware<F> {
    /// Creates a new function-based middleware.
    pub fn new<Fut>(name: &'static str, func: F) -> Self
    where
        F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = KantoResult<Response>> + Send + 'static,
    {
        Self { name, func }
    }
}

impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = KantoResult<Response>> + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn process<'a>(&'a self, ctx: Context, next: Next) -> BoxFuture<'a, KantoResult<Response>> {
        Box::pin((self.func)(ctx, next))
    }
}

impl<F> fmt::Debug for FnMiddleware<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMiddleware")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
