//! In-memory test client.

use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use kanto_core::response::JSON_CONTENT_TYPE;
use kanto_server::App;
use serde::Serialize;

use crate::error::TestError;
use crate::response::TestResponse;

/// Sends requests straight into [`App::handle`].
///
/// Clones share the same application.
#[derive(Debug, Clone)]
pub struct TestClient {
    app: Arc<App>,
    default_headers: Vec<(String, String)>,
}

impl TestClient {
    /// Wraps an application.
    #[must_use]
    pub fn new(app: App) -> Self {
        Self::from_shared(Arc::new(app))
    }

    /// Wraps an application that is already shared.
    #[must_use]
    pub fn from_shared(app: Arc<App>) -> Self {
        Self {
            app,
            default_headers: Vec::new(),
        }
    }

    /// Adds a header sent with every request.
    #[must_use]
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Returns the application under test.
    #[must_use]
    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    /// Starts a `GET` request.
    #[must_use]
    pub fn get(&self, uri: &str) -> TestRequest<'_> {
        self.request(Method::GET, uri)
    }

    /// Starts a `POST` request.
    #[must_use]
    pub fn post(&self, uri: &str) -> TestRequest<'_> {
        self.request(Method::POST, uri)
    }

    /// Starts a `PUT` request.
    #[must_use]
    pub fn put(&self, uri: &str) -> TestRequest<'_> {
        self.request(Method::PUT, uri)
    }

    /// Starts a `PATCH` request.
    #[must_use]
    pub fn patch(&self, uri: &str) -> TestRequest<'_> {
        self.request(Method::PATCH, uri)
    }

    /// Starts a `DELETE` request.
    #[must_use]
    pub fn delete(&self, uri: &str) -> TestRequest<'_> {
        self.request(Method::DELETE, uri)
    }

    /// Starts an `OPTIONS` request.
    #[must_use]
    pub fn options(&self, uri: &str) -> TestRequest<'_> {
        self.request(Method::OPTIONS, uri)
    }

    /// Starts a request with any method.
    #[must_use]
    pub fn request(&self, method: Method, uri: &str) -> TestRequest<'_> {
        let mut request = TestRequest {
            client: self,
            method,
            uri: uri.to_string(),
            headers: Vec::new(),
            body: Bytes::new(),
            error: None,
        };
        for (name, value) in &self.default_headers {
            request = request.header(name, value);
        }
        request
    }
}

/// A request being built against a [`TestClient`].
#[derive(Debug)]
#[must_use]
pub struct TestRequest<'a> {
    client: &'a TestClient,
    method: Method,
    uri: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Bytes,
    error: Option<TestError>,
}

impl TestRequest<'_> {
    /// Adds a header.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => self.headers.push((name, value)),
            _ => self.fail(format!("invalid header {name}: {value}")),
        }
        self
    }

    /// Sets `authorization: Bearer <token>`.
    pub fn bearer_token(self, token: &str) -> Self {
        self.header(AUTHORIZATION.as_str(), &format!("Bearer {token}"))
    }

    /// Appends query parameters.
    pub fn query<T: Serialize + ?Sized>(mut self, params: &T) -> Self {
        match serde_urlencoded::to_string(params) {
            Ok(encoded) if encoded.is_empty() => {}
            Ok(encoded) => {
                let separator = if self.uri.contains('?') { '&' } else { '?' };
                self.uri.push(separator);
                self.uri.push_str(&encoded);
            }
            Err(e) => self.fail(format!("invalid query: {e}")),
        }
        self
    }

    /// Sets the raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a JSON body and `content-type: application/json`.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => {
                self.body = Bytes::from(body);
                self.headers
                    .push((CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE)));
            }
            Err(e) => self.error = Some(e.into()),
        }
        self
    }

    /// Sends the request.
    ///
    /// # Panics
    ///
    /// Panics if the request could not be built; use
    /// [`try_send`](Self::try_send) to handle that case.
    pub async fn send(self) -> TestResponse {
        match self.try_send().await {
            Ok(response) => response,
            Err(e) => panic!("test request failed: {e}"),
        }
    }

    /// Sends the request, reporting build failures.
    ///
    /// # Errors
    ///
    /// Returns [`TestError`] if a header, query or body could not be
    /// encoded, or the URI is invalid.
    pub async fn try_send(self) -> Result<TestResponse, TestError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let mut builder = http::Request::builder()
            .method(self.method)
            .uri(self.uri.as_str());
        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }
        let request = builder
            .body(self.body)
            .map_err(|e| TestError::RequestBuild(e.to_string()))?;

        let response = self.client.app.handle(request).await;
        Ok(TestResponse::from(response))
    }

    fn fail(&mut self, message: String) {
        if self.error.is_none() {
            self.error = Some(TestError::RequestBuild(message));
        }
    }
}
