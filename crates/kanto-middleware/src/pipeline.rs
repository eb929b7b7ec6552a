//! Chain executor.
//!
//! A [`Pipeline`] is an ordered list of middleware in front of a terminal
//! handler. Running it builds a fresh [`Next`] positioned before the first
//! layer, so one pipeline serves any number of concurrent requests.

use std::sync::Arc;

use kanto_core::{BoxFuture, Context, Handler, KantoResult, Response};

use crate::middleware::{BoxedMiddleware, Middleware, Next};

/// Middleware layers in front of a handler.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use kanto_core::{Context, Params, Services};
/// use kanto_middleware::{FnMiddleware, Pipeline};
///
/// # tokio_test::block_on(async {
/// let pipeline = Pipeline::builder()
///     .layer(FnMiddleware::new("outer", |ctx, next| next.run(ctx)))
///     .handler(|ctx: Context| async move { Ok(ctx.text("pong")) });
///
/// let request = http::Request::builder().uri("/ping").body(Bytes::new()).unwrap();
/// let ctx = Context::new(request, Params::new(), Services::empty());
/// let response = pipeline.run(ctx).await.unwrap();
/// assert_eq!(response.body().as_ref(), b"pong");
/// # });
/// ```
#[derive(Clone)]
pub struct Pipeline {
    layers: Vec<BoxedMiddleware>,
    endpoint: Arc<dyn Handler>,
}

impl Pipeline {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Creates a pipeline from already boxed parts.
    #[must_use]
    pub fn new(layers: Vec<BoxedMiddleware>, endpoint: Arc<dyn Handler>) -> Self {
        Self { layers, endpoint }
    }

    /// Runs the request through every layer and the handler.
    pub fn run(&self, ctx: Context) -> BoxFuture<'static, KantoResult<Response>> {
        Next::start(self.layers.clone(), Arc::clone(&self.endpoint)).run(ctx)
    }

    /// Returns the names of all layers, outermost first.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|m| m.name()).collect()
    }

    /// Returns the number of layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Returns `true` if the handler is called directly.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish_non_exhaustive()
    }
}

/// Builder for constructing a [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    layers: Vec<BoxedMiddleware>,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware; earlier layers wrap later ones.
    #[must_use]
    pub fn layer<M: Middleware>(mut self, middleware: M) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    /// Appends already boxed middleware.
    #[must_use]
    pub fn layers<I>(mut self, layers: I) -> Self
    where
        I: IntoIterator<Item = BoxedMiddleware>,
    {
        self.layers.extend(layers);
        self
    }

    /// Finishes the pipeline with its terminal handler.
    #[must_use]
    pub fn handler<H: Handler>(self, handler: H) -> Pipeline {
        Pipeline::new(self.layers, Arc::new(handler))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FnMiddleware;
    use bytes::Bytes;
    use kanto_core::{KantoError, Params, Services};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Log = Arc<Mutex<Vec<String>>>;

    fn ctx() -> Context {
        let request = http::Request::builder()
            .uri("/cards")
            .body(Bytes::new())
            .unwrap();
        Context::new(request, Params::new(), Services::empty())
    }

    struct Recorder {
        name: &'static str,
        log: Log,
    }

    impl Middleware for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process<'a>(&'a self, ctx: Context, next: Next) -> BoxFuture<'a, KantoResult<Response>> {
            Box::pin(async move {
                self.log.lock().push(format!("{}:before", self.name));
                let response = next.run(ctx).await;
                self.log.lock().push(format!("{}:after", self.name));
                response
            })
        }
    }

    fn logging(name: &'static str, log: &Log) -> Recorder {
        Recorder {
            name,
            log: log.clone(),
        }
    }

    #[tokio::test]
    async fn test_onion_order() {
        let log: Log = Arc::default();
        let handler_log = log.clone();
        let pipeline = Pipeline::builder()
            .layer(logging("first", &log))
            .layer(logging("second", &log))
            .handler(move |ctx: Context| {
                let log = handler_log.clone();
                async move {
                    log.lock().push("handler".to_string());
                    Ok(ctx.text("ok"))
                }
            });

        pipeline.run(ctx()).await.unwrap();

        assert_eq!(
            *log.lock(),
            vec![
                "first:before",
                "second:before",
                "handler",
                "second:after",
                "first:after"
            ]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let pipeline = Pipeline::builder()
            .layer(FnMiddleware::new("deny", |ctx: Context, _next: Next| async move {
                Ok(ctx.error(http::StatusCode::FORBIDDEN, "FORBIDDEN", "nope"))
            }))
            .handler(move |ctx: Context| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(ctx.text("unreachable")) }
            });

        let response = pipeline.run(ctx()).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::FORBIDDEN);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_error_propagates_through_layers() {
        let log: Log = Arc::default();
        let pipeline = Pipeline::builder()
            .layer(logging("outer", &log))
            .handler(|_ctx: Context| async move {
                Err::<Response, _>(KantoError::not_found("no such card"))
            });

        let err = pipeline.run(ctx()).await.unwrap_err();
        assert_eq!(err.status_code(), http::StatusCode::NOT_FOUND);
        assert_eq!(*log.lock(), vec!["outer:before", "outer:after"]);
    }

    #[tokio::test]
    async fn test_post_processing_sees_response() {
        let pipeline = Pipeline::builder()
            .layer(FnMiddleware::new("stamp", |ctx: Context, next: Next| async move {
                let mut response = next.run(ctx).await?;
                response
                    .headers_mut()
                    .insert("x-stage", http::HeaderValue::from_static("stamp"));
                Ok(response)
            }))
            .handler(|ctx: Context| async move { Ok(ctx.text("ok")) });

        let response = pipeline.run(ctx()).await.unwrap();
        assert_eq!(response.headers()["x-stage"], "stamp");
    }

    #[tokio::test]
    async fn test_empty_pipeline_calls_handler() {
        let pipeline =
            Pipeline::builder().handler(|ctx: Context| async move { Ok(ctx.text("direct")) });
        assert!(pipeline.is_empty());
        let response = pipeline.run(ctx()).await.unwrap();
        assert_eq!(response.body().as_ref(), b"direct");
    }

    #[tokio::test]
    async fn test_next_remaining() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (seen.clone(), seen.clone());
        let pipeline = Pipeline::builder()
            .layer(FnMiddleware::new("a", move |ctx: Context, next: Next| {
                a.lock().push(next.remaining());
                next.run(ctx)
            }))
            .layer(FnMiddleware::new("b", move |ctx: Context, next: Next| {
                b.lock().push(next.remaining());
                next.run(ctx)
            }))
            .handler(|ctx: Context| async move { Ok(ctx.text("ok")) });

        assert_eq!(pipeline.stage_names(), vec!["a", "b"]);
        pipeline.run(ctx()).await.unwrap();
        assert_eq!(*seen.lock(), vec![1, 0]);
    }
}
