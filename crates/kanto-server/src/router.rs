//! Route grouping.
//!
//! A [`Router`] collects routes under a base path together with
//! middleware that applies only to those routes. Routers are handed to
//! [`App::routes`](crate::App::routes), which compiles their templates.
//!
//! ```rust
//! use http::Method;
//! use kanto_core::Context;
//! use kanto_server::Router;
//!
//! let router = Router::new("/api/")
//!     .get("/cards/:id", |ctx: Context| async move { Ok(ctx.no_content()) })
//!     .post("cards", |ctx: Context| async move { Ok(ctx.no_content()) });
//!
//! let paths: Vec<_> = router.routes().iter().map(|r| r.path()).collect();
//! assert_eq!(paths, ["/api/cards/:id", "/api/cards"]);
//! assert_eq!(router.routes()[1].method(), Method::POST);
//! ```

use std::fmt;
use std::sync::Arc;

use http::Method;
use kanto_core::Handler;
use kanto_middleware::{BoxedMiddleware, Middleware};
use kanto_router::normalize_path;

/// A registered route: method, full path and handler.
#[derive(Clone)]
pub struct Route {
    method: Method,
    path: String,
    handler: Arc<dyn Handler>,
}

impl Route {
    /// Returns the route method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the normalized path, base path included.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the handler.
    #[must_use]
    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// A group of routes under a common base path.
#[derive(Clone, Default)]
pub struct Router {
    base_path: String,
    routes: Vec<Route>,
    middleware: Vec<BoxedMiddleware>,
}

impl Router {
    /// Creates a router mounted at `base_path`.
    #[must_use]
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            routes: Vec::new(),
            middleware: Vec::new(),
        }
    }

    /// Appends middleware that wraps every route of this router.
    ///
    /// Router middleware runs after the application's global middleware.
    #[must_use]
    pub fn use_middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Registers a route for an arbitrary method.
    #[must_use]
    pub fn route<H: Handler>(mut self, method: Method, path: &str, handler: H) -> Self {
        let path = normalize_path(&format!("{}/{path}", self.base_path));
        self.routes.push(Route {
            method,
            path,
            handler: Arc::new(handler),
        });
        self
    }

    /// Registers a `GET` route.
    #[must_use]
    pub fn get<H: Handler>(self, path: &str, handler: H) -> Self {
        self.route(Method::GET, path, handler)
    }

    /// Registers a `POST` route.
    #[must_use]
    pub fn post<H: Handler>(self, path: &str, handler: H) -> Self {
        self.route(Method::POST, path, handler)
    }

    /// Registers a `PUT` route.
    #[must_use]
    pub fn put<H: Handler>(self, path: &str, handler: H) -> Self {
        self.route(Method::PUT, path, handler)
    }

    /// Registers a `PATCH` route.
    #[must_use]
    pub fn patch<H: Handler>(self, path: &str, handler: H) -> Self {
        self.route(Method::PATCH, path, handler)
    }

    /// Registers a `DELETE` route.
    #[must_use]
    pub fn delete<H: Handler>(self, path: &str, handler: H) -> Self {
        self.route(Method::DELETE, path, handler)
    }

    /// Registers a `HEAD` route.
    #[must_use]
    pub fn head<H: Handler>(self, path: &str, handler: H) -> Self {
        self.route(Method::HEAD, path, handler)
    }

    /// Registers an `OPTIONS` route.
    #[must_use]
    pub fn options<H: Handler>(self, path: &str, handler: H) -> Self {
        self.route(Method::OPTIONS, path, handler)
    }

    /// Returns the base path as given.
    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Returns the routes in registration order.
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Returns the router middleware in registration order.
    #[must_use]
    pub fn middleware(&self) -> &[BoxedMiddleware] {
        &self.middleware
    }

    pub(crate) fn into_parts(self) -> (Vec<Route>, Vec<BoxedMiddleware>) {
        (self.routes, self.middleware)
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("base_path", &self.base_path)
            .field("routes", &self.routes)
            .field(
                "middleware",
                &self.middleware.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
