//! Cross-origin resource sharing.
//!
//! Preflight requests (`OPTIONS` with `access-control-request-method`) are
//! answered here with `204 No Content` and never reach the handler. Other
//! requests continue down the chain and get the allow-origin headers added
//! to whatever response comes back, including error responses built later
//! by the dispatcher.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use http::Method;
//! use kanto_middleware::stages::Cors;
//!
//! let cors = Cors::builder()
//!     .allow_origin("https://pokedex.example")
//!     .allow_methods([Method::GET, Method::POST])
//!     .expose_headers(["x-request-id"])
//!     .max_age(Duration::from_secs(600))
//!     .build();
//! ```

use std::time::Duration;

use http::header::{self, HeaderValue};
use http::{Method, StatusCode};
use kanto_core::{BoxFuture, Context, KantoResult, Response};

use crate::middleware::{Middleware, Next};

/// Which origins may call the API.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Origins {
    Any,
    List(Vec<String>),
}

/// CORS middleware.
#[derive(Debug, Clone)]
pub struct Cors {
    origins: Origins,
    methods: Vec<Method>,
    headers: Vec<String>,
    expose: Vec<String>,
    credentials: bool,
    max_age: Option<Duration>,
}

impl Default for Cors {
    fn default() -> Self {
        Self {
            origins: Origins::List(Vec::new()),
            methods: vec![
                Method::GET,
                Method::HEAD,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
            ],
            headers: vec![
                "content-type".to_string(),
                "authorization".to_string(),
                "x-request-id".to_string(),
            ],
            expose: Vec::new(),
            credentials: false,
            max_age: Some(Duration::from_secs(86_400)),
        }
    }
}

impl Cors {
    /// Creates a new CORS builder.
    #[must_use]
    pub fn builder() -> CorsBuilder {
        CorsBuilder::default()
    }

    /// Allows every origin with the default methods and headers.
    #[must_use]
    pub fn permissive() -> Self {
        Self::builder().allow_any_origin().build()
    }

    fn allow_origin_value(&self, origin: &str) -> Option<HeaderValue> {
        match &self.origins {
            Origins::Any if !self.credentials => Some(HeaderValue::from_static("*")),
            Origins::Any => HeaderValue::from_str(origin).ok(),
            Origins::List(list) => list
                .iter()
                .any(|o| o == origin)
                .then(|| HeaderValue::from_str(origin).ok())
                .flatten(),
        }
    }

    fn join<T: AsRef<str>>(values: &[T]) -> Option<HeaderValue> {
        if values.is_empty() {
            return None;
        }
        let joined = values
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(", ");
        HeaderValue::from_str(&joined).ok()
    }

    fn preflight(&self, ctx: &Context, origin: Option<&str>) -> Response {
        let mut response = ctx.no_content();
        let Some(allow_origin) = origin.and_then(|o| self.allow_origin_value(o)) else {
            return response;
        };

        let requested = ctx
            .header("access-control-request-method")
            .and_then(|m| m.parse::<Method>().ok());
        if !requested.is_some_and(|m| self.methods.contains(&m)) {
            return response;
        }

        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
        let methods: Vec<&str> = self.methods.iter().map(Method::as_str).collect();
        if let Some(value) = Self::join(&methods) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, value);
        }
        if let Some(value) = Self::join(&self.headers) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, value);
        }
        if self.credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        if let Some(max_age) = self.max_age {
            headers.insert(
                header::ACCESS_CONTROL_MAX_AGE,
                HeaderValue::from(max_age.as_secs()),
            );
        }
        headers.insert(header::VARY, HeaderValue::from_static("origin"));
        response
    }

    fn decorate(&self, response: &mut Response, origin: &str) {
        let Some(allow_origin) = self.allow_origin_value(origin) else {
            return;
        };
        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
        if self.credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        if let Some(value) = Self::join(&self.expose) {
            headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, value);
        }
        headers.append(header::VARY, HeaderValue::from_static("origin"));
    }
}

impl Middleware for Cors {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn process<'a>(&'a self, ctx: Context, next: Next) -> BoxFuture<'a, KantoResult<Response>> {
        Box::pin(async move {
            let origin = ctx.header("origin").map(str::to_string);

            if ctx.method() == Method::OPTIONS
                && ctx.headers().contains_key("access-control-request-method")
            {
                return Ok(self.preflight(&ctx, origin.as_deref()));
            }

            let result = next.run(ctx.clone()).await;
            let Some(origin) = origin else { return result };

            // Errors become envelopes here so they carry the CORS headers too.
            let mut response = match result {
                Ok(response) => response,
                Err(error) if error.status_code() == StatusCode::INTERNAL_SERVER_ERROR => {
                    return Err(error)
                }
                Err(error) => ctx.error_response(&error),
            };
            self.decorate(&mut response, &origin);
            Ok(response)
        })
    }
}

/// Builder for [`Cors`].
#[derive(Debug, Clone, Default)]
pub struct CorsBuilder {
    cors: Cors,
}

impl CorsBuilder {
    /// Adds an allowed origin.
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        if let Origins::List(list) = &mut self.cors.origins {
            list.push(origin.into());
        }
        self
    }

    /// Allows every origin.
    ///
    /// With credentials enabled the request origin is echoed instead of `*`.
    #[must_use]
    pub fn allow_any_origin(mut self) -> Self {
        self.cors.origins = Origins::Any;
        self
    }

    /// Replaces the allowed methods.
    #[must_use]
    pub fn allow_methods<I: IntoIterator<Item = Method>>(mut self, methods: I) -> Self {
        self.cors.methods = methods.into_iter().collect();
        self
    }

    /// Replaces the allowed request headers.
    #[must_use]
    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cors.headers = headers
            .into_iter()
            .map(|h| h.into().to_ascii_lowercase())
            .collect();
        self
    }

    /// Sets the response headers readable by browser scripts.
    #[must_use]
    pub fn expose_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cors.expose = headers
            .into_iter()
            .map(|h| h.into().to_ascii_lowercase())
            .collect();
        self
    }

    /// Allows cookies and authorization headers.
    #[must_use]
    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.cors.credentials = allow;
        self
    }

    /// Sets how long browsers may cache a preflight answer.
    #[must_use]
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.cors.max_age = Some(max_age);
        self
    }

    /// Builds the middleware.
    #[must_use]
    pub fn build(self) -> Cors {
        self.cors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::{ctx, get};
    use crate::Pipeline;
    use kanto_core::KantoError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn preflight(origin: &str, method: &str) -> Context {
        ctx(http::Request::builder()
            .method(Method::OPTIONS)
            .uri("/cards")
            .header("origin", origin)
            .header("access-control-request-method", method))
    }

    fn pipeline(cors: Cors, calls: &Arc<AtomicUsize>) -> Pipeline {
        let calls = calls.clone();
        Pipeline::builder().layer(cors).handler(move |ctx: Context| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(ctx.text("cards")) }
        })
    }

    #[tokio::test]
    async fn test_preflight_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cors = Cors::builder()
            .allow_origin("https://pokedex.example")
            .max_age(Duration::from_secs(600))
            .build();

        let response = pipeline(cors, &calls)
            .run(preflight("https://pokedex.example", "POST"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let headers = response.headers();
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://pokedex.example"
        );
        assert!(headers[header::ACCESS_CONTROL_ALLOW_METHODS]
            .to_str()
            .unwrap()
            .contains("POST"));
        assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "600");
    }

    #[tokio::test]
    async fn test_preflight_disallowed_origin() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cors = Cors::builder().allow_origin("https://pokedex.example").build();

        let response = pipeline(cors, &calls)
            .run(preflight("https://evil.example", "GET"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(!response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_preflight_disallowed_method() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cors = Cors::builder()
            .allow_any_origin()
            .allow_methods([Method::GET])
            .build();

        let response = pipeline(cors, &calls)
            .run(preflight("https://a.example", "DELETE"))
            .await
            .unwrap();
        assert!(!response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn test_simple_request_gets_headers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cors = Cors::builder()
            .allow_any_origin()
            .expose_headers(["X-Request-Id"])
            .build();

        let request = ctx(http::Request::builder()
            .uri("/cards")
            .header("origin", "https://a.example"));
        let response = pipeline(cors, &calls).run(request).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_EXPOSE_HEADERS],
            "x-request-id"
        );
    }

    #[tokio::test]
    async fn test_credentials_echo_origin() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cors = Cors::builder()
            .allow_any_origin()
            .allow_credentials(true)
            .build();

        let request = ctx(http::Request::builder()
            .uri("/cards")
            .header("origin", "https://a.example"));
        let response = pipeline(cors, &calls).run(request).await.unwrap();
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://a.example");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[tokio::test]
    async fn test_no_origin_untouched() {
        let calls = Arc::new(AtomicUsize::new(0));
        let response = pipeline(Cors::permissive(), &calls)
            .run(get("/cards"))
            .await
            .unwrap();
        assert!(!response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn test_typed_error_gets_headers() {
        let pipeline = Pipeline::builder()
            .layer(Cors::permissive())
            .handler(|_ctx: Context| async move {
                Err::<Response, _>(KantoError::not_found("no such card"))
            });

        let request = ctx(http::Request::builder()
            .uri("/cards/x")
            .header("origin", "https://a.example"));
        let response = pipeline.run(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}
