//! The application: dispatch table, global middleware and container.

use std::any::Any;
use std::fmt;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use http::Method;
use kanto_core::{
    response, Container, Context, Handler, KantoError, KantoResult, Params, Request, Response,
    Services,
};
use kanto_middleware::{BoxedMiddleware, Middleware, Pipeline};
use kanto_router::PathPattern;
use tokio::net::{TcpListener, ToSocketAddrs};

use crate::config::ServerConfig;
use crate::error::{RouteError, ServerError};
use crate::router::Router;
use crate::server;
use crate::shutdown::ShutdownSignal;

struct CompiledRoute {
    method: Method,
    pattern: PathPattern,
    handler: Arc<dyn Handler>,
    middleware: Vec<BoxedMiddleware>,
}

async fn route_not_found(ctx: Context) -> KantoResult<Response> {
    Ok(ctx.not_found())
}

/// The composition root of a Kanto service.
///
/// An `App` owns the global middleware, the compiled route table and the
/// optional service [`Container`]. Routes are matched in registration
/// order and the first route whose method and pattern match wins.
///
/// Each request runs through global middleware first, then the matched
/// router's middleware, then the handler. Unmatched requests still pass
/// through global middleware before receiving a `404` envelope.
///
/// # Example
///
/// ```rust
/// use http::StatusCode;
/// use kanto_core::Context;
/// use kanto_server::{App, Router};
///
/// # tokio_test::block_on(async {
/// let mut app = App::new();
/// app.routes(Router::new("/cards").get("/:id", |ctx: Context| async move {
///     let id = ctx.params().get("id").unwrap_or_default().to_string();
///     ctx.json(&serde_json::json!({ "id": id }))
/// }))
/// .unwrap();
///
/// let request = http::Request::get("/cards/abc123").body(bytes::Bytes::new()).unwrap();
/// let response = app.handle(request).await;
/// assert_eq!(response.status(), StatusCode::OK);
/// assert_eq!(&response.body()[..], br#"{"id":"abc123"}"#);
/// # });
/// ```
pub struct App {
    middleware: Vec<BoxedMiddleware>,
    routes: Vec<CompiledRoute>,
    container: Option<Arc<Container>>,
    config: ServerConfig,
    shutdown: ShutdownSignal,
    fallback: Arc<dyn Handler>,
}

impl App {
    /// Creates an application without services.
    #[must_use]
    pub fn new() -> Self {
        Self {
            middleware: Vec::new(),
            routes: Vec::new(),
            container: None,
            config: ServerConfig::default(),
            shutdown: ShutdownSignal::new(),
            fallback: Arc::new(route_not_found),
        }
    }

    /// Attaches the service container exposed to handlers.
    #[must_use]
    pub fn with_container(mut self, container: Arc<Container>) -> Self {
        self.container = Some(container);
        self
    }

    /// Replaces the server configuration.
    #[must_use]
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Appends global middleware.
    ///
    /// Global middleware wraps every request, including ones that match
    /// no route.
    pub fn use_middleware<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Compiles and mounts every route of `router`.
    ///
    /// Either all routes of the router are mounted or none are.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError`] if a route template does not compile.
    pub fn routes(&mut self, router: Router) -> Result<&mut Self, RouteError> {
        let (routes, middleware) = router.into_parts();
        let compiled = routes
            .into_iter()
            .map(|route| {
                let pattern = PathPattern::compile(route.path()).map_err(|source| RouteError {
                    method: route.method().clone(),
                    path: route.path().to_owned(),
                    source,
                })?;
                Ok(CompiledRoute {
                    method: route.method().clone(),
                    pattern,
                    handler: Arc::clone(route.handler()),
                    middleware: middleware.clone(),
                })
            })
            .collect::<Result<Vec<_>, RouteError>>()?;

        for route in &compiled {
            tracing::debug!(
                http.method = %route.method,
                http.route = route.pattern.template(),
                middleware = route.middleware.len(),
                "route mounted"
            );
        }
        self.routes.extend(compiled);
        Ok(self)
    }

    /// Mounts a single route with no router middleware.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError`] if the template does not compile.
    pub fn route<H: Handler>(
        &mut self,
        method: Method,
        path: &str,
        handler: H,
    ) -> Result<&mut Self, RouteError> {
        self.routes(Router::new("").route(method, path, handler))
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the attached container, if any.
    #[must_use]
    pub fn container(&self) -> Option<&Arc<Container>> {
        self.container.as_ref()
    }

    /// Returns the number of mounted routes.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Returns a handle that stops a running [`listen`](Self::listen).
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Dispatches one buffered request and always produces a response.
    ///
    /// Errors returned by middleware or handlers become JSON envelopes.
    /// Panics are caught here and become a generic `500`. The response
    /// always carries `x-request-id`.
    pub async fn handle(&self, request: Request) -> Response {
        let method = request.method().clone();
        let path = request.uri().path().to_owned();

        let (route, params) = self.match_route(&method, &path);
        let ctx = Context::new(request, params, self.services());
        let request_id = ctx.request_id().as_str().to_owned();

        let mut layers = self.middleware.clone();
        let endpoint = match route {
            Some(route) => {
                layers.extend(route.middleware.iter().cloned());
                Arc::clone(&route.handler)
            }
            None => Arc::clone(&self.fallback),
        };
        let pipeline = Pipeline::new(layers, endpoint);

        let outcome = AssertUnwindSafe(async move { pipeline.run(ctx).await })
            .catch_unwind()
            .await;

        let mut response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => {
                if error.is_internal() {
                    tracing::error!(
                        request_id = %request_id,
                        http.method = %method,
                        http.path = %path,
                        error = ?error,
                        "request failed"
                    );
                } else {
                    tracing::debug!(
                        request_id = %request_id,
                        http.method = %method,
                        http.path = %path,
                        error = %error,
                        "request rejected"
                    );
                }
                response::from_error(&error, &request_id)
            }
            Err(panic) => {
                tracing::error!(
                    request_id = %request_id,
                    http.method = %method,
                    http.path = %path,
                    panic = panic_message(panic.as_ref()),
                    "handler panicked"
                );
                response::from_error(&KantoError::internal("handler panicked"), &request_id)
            }
        };
        response::ensure_request_id(&mut response, &request_id);
        response
    }

    /// Starts the container, binds `host:port` and serves until shutdown.
    ///
    /// The host comes from [`ServerConfig::host`]; port `0` picks a free
    /// port. `on_ready` receives the bound address before the first
    /// connection is accepted. After the shutdown signal fires, open
    /// connections are drained and the container is stopped.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if the container fails to start or stop, or
    /// the listener cannot be bound.
    pub async fn listen<F>(self, port: u16, on_ready: F) -> Result<(), ServerError>
    where
        F: FnOnce(SocketAddr) + Send,
    {
        let host = self.config.host().to_owned();
        let label = format!("{host}:{port}");
        self.serve((host.as_str(), port), label, on_ready).await
    }

    /// Like [`listen`](Self::listen) with an explicit socket address.
    ///
    /// # Errors
    ///
    /// See [`listen`](Self::listen).
    pub async fn listen_on<F>(self, addr: SocketAddr, on_ready: F) -> Result<(), ServerError>
    where
        F: FnOnce(SocketAddr) + Send,
    {
        self.serve(addr, addr.to_string(), on_ready).await
    }

    /// Stops the container, running `stop` hooks in reverse order.
    ///
    /// Without a container this does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Container`] if a stop hook fails.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        if let Some(container) = &self.container {
            container.stop().await?;
        }
        Ok(())
    }

    async fn serve<A, F>(self, addr: A, label: String, on_ready: F) -> Result<(), ServerError>
    where
        A: ToSocketAddrs + Send,
        F: FnOnce(SocketAddr) + Send,
    {
        if let Some(container) = &self.container {
            container.start().await?;
        }

        let (listener, local_addr) = match bind(addr, label).await {
            Ok(bound) => bound,
            Err(error) => {
                if let Err(stop_error) = self.shutdown().await {
                    tracing::warn!(error = %stop_error, "failed to stop services after bind failure");
                }
                return Err(error);
            }
        };

        tracing::info!(addr = %local_addr, routes = self.routes.len(), "server listening");
        on_ready(local_addr);

        let os_signals = self.shutdown.watch_os_signals();
        let shutdown = self.shutdown.clone();
        let app = Arc::new(self);
        server::serve(Arc::clone(&app), listener, shutdown).await;
        os_signals.abort();

        app.shutdown().await?;
        tracing::info!("server stopped");
        Ok(())
    }

    fn match_route(&self, method: &Method, path: &str) -> (Option<&CompiledRoute>, Params) {
        self.routes
            .iter()
            .filter(|route| route.method == *method)
            .find_map(|route| route.pattern.matches(path).map(|params| (Some(route), params)))
            .unwrap_or_else(|| (None, Params::new()))
    }

    fn services(&self) -> Services {
        self.container
            .as_ref()
            .map_or_else(Services::empty, |container| Services::new(Arc::clone(container)))
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let routes: Vec<_> = self
            .routes
            .iter()
            .map(|route| format!("{} {}", route.method, route.pattern.template()))
            .collect();
        f.debug_struct("App")
            .field("routes", &routes)
            .field(
                "middleware",
                &self.middleware.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .field("container", &self.container.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

async fn bind<A: ToSocketAddrs>(
    addr: A,
    label: String,
) -> Result<(TcpListener, SocketAddr), ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: label,
            source,
        })?;
    let local_addr = listener.local_addr()?;
    Ok((listener, local_addr))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
