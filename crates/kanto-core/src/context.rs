//! Request context types.
//!
//! A [`Context`] is built once per request by the dispatcher. It is
//! immutable, cheap to clone (it is an `Arc` handle) and carries the request,
//! the matched path parameters, a query accessor, the request id and a
//! read-only view over the service container.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::di::Services;
use crate::error::{ErrorEnvelope, KantoError, KantoResult};
use crate::handler::{Request, Response};
use crate::query::Query;
use crate::response;
use kanto_router::Params;

/// Header used to propagate the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation identifier for a request.
///
/// An inbound `x-request-id` is reused verbatim; otherwise a fresh UUID v7 is
/// generated. UUID v7 is time-ordered, which keeps generated ids sortable in
/// logs.
///
/// # Example
///
/// ```
/// use kanto_core::RequestId;
///
/// let generated = RequestId::new();
/// assert_eq!(generated.as_str().len(), 36);
///
/// let inbound = RequestId::from_header(Some("edge-42"));
/// assert_eq!(inbound.as_str(), "edge-42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Creates a new request id using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Reuses an inbound header value when it is usable, otherwise generates one.
    ///
    /// Any non-empty value that is itself a valid header value is kept
    /// verbatim, spaces included, so it can be echoed back unchanged.
    #[must_use]
    pub fn from_header(value: Option<&str>) -> Self {
        match value {
            Some(v) if !v.is_empty() && HeaderValue::from_str(v).is_ok() => Self(v.to_string()),
            _ => Self::new(),
        }
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }
}

struct Inner {
    request: Request,
    params: Params,
    query: Query,
    services: Services,
    request_id: RequestId,
    started_at: Instant,
}

/// Per-request context passed through middleware and into handlers.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use kanto_core::{Context, Params, Services};
///
/// let request = http::Request::builder()
///     .uri("/cards?page=2")
///     .header("x-request-id", "abc")
///     .body(Bytes::new())
///     .unwrap();
///
/// let ctx = Context::new(request, Params::new(), Services::empty());
/// assert_eq!(ctx.path(), "/cards");
/// assert_eq!(ctx.query().get_number_or("page", 1_u32), 2);
/// assert_eq!(ctx.request_id().as_str(), "abc");
/// ```
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    /// Builds the context for one request.
    #[must_use]
    pub fn new(request: Request, params: Params, services: Services) -> Self {
        let request_id = RequestId::from_header(
            request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok()),
        );
        let query = Query::parse(request.uri().query().unwrap_or_default());

        Self {
            inner: Arc::new(Inner {
                request,
                params,
                query,
                services,
                request_id,
                started_at: Instant::now(),
            }),
        }
    }

    /// Returns the raw request.
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.inner.request
    }

    /// Returns the request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        self.inner.request.method()
    }

    /// Returns the request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        self.inner.request.uri()
    }

    /// Returns the request path, without the query string.
    #[must_use]
    pub fn path(&self) -> &str {
        self.inner.request.uri().path()
    }

    /// Returns the request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.inner.request.headers()
    }

    /// Returns a header value as a string, if present and valid.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the request body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        self.inner.request.body()
    }

    /// Deserializes the request body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`KantoError::BadRequest`] if the body is not valid JSON for `T`.
    pub fn json_body<T: DeserializeOwned>(&self) -> KantoResult<T> {
        serde_json::from_slice(self.body())
            .map_err(|e| KantoError::bad_request(format!("invalid JSON body: {e}")))
    }

    /// Returns the matched path parameters.
    #[must_use]
    pub fn params(&self) -> &Params {
        &self.inner.params
    }

    /// Returns the query string accessor.
    #[must_use]
    pub fn query(&self) -> &Query {
        &self.inner.query
    }

    /// Returns the read-only service view.
    #[must_use]
    pub fn services(&self) -> &Services {
        &self.inner.services
    }

    /// Returns the request id.
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        &self.inner.request_id
    }

    /// Returns when the context was created.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.inner.started_at
    }

    /// Returns the time spent on this request so far.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.inner.started_at.elapsed()
    }

    /// Responds with `200 OK` and a JSON body.
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> KantoResult<Response> {
        self.json_with_status(StatusCode::OK, value)
    }

    /// Responds with the given status and a JSON body.
    pub fn json_with_status<T: Serialize + ?Sized>(
        &self,
        status: StatusCode,
        value: &T,
    ) -> KantoResult<Response> {
        response::json(status, value, self.request_id().as_str())
    }

    /// Responds with `200 OK` and a plain text body.
    #[must_use]
    pub fn text(&self, body: impl Into<String>) -> Response {
        response::text(StatusCode::OK, body, self.request_id().as_str())
    }

    /// Responds with the given status and no body.
    #[must_use]
    pub fn empty(&self, status: StatusCode) -> Response {
        response::empty(status, self.request_id().as_str())
    }

    /// Responds with `204 No Content`.
    #[must_use]
    pub fn no_content(&self) -> Response {
        self.empty(StatusCode::NO_CONTENT)
    }

    /// Responds with the standard `404` envelope.
    #[must_use]
    pub fn not_found(&self) -> Response {
        self.not_found_with("Not Found")
    }

    /// Responds with a `404` envelope carrying a custom message.
    #[must_use]
    pub fn not_found_with(&self, message: impl Into<String>) -> Response {
        self.error(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    /// Responds with a `400` envelope.
    #[must_use]
    pub fn bad_request(&self, message: impl Into<String>) -> Response {
        self.error(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// Responds with an arbitrary error envelope.
    #[must_use]
    pub fn error(
        &self,
        status: StatusCode,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Response {
        response::envelope(
            status,
            &ErrorEnvelope::new(status, code, message),
            self.request_id().as_str(),
        )
    }

    /// Responds with the envelope for a [`KantoError`].
    #[must_use]
    pub fn error_response(&self, error: &KantoError) -> Response {
        response::from_error(error, self.request_id().as_str())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("request_id", &self.inner.request_id)
            .field("method", self.method())
            .field("path", &self.path())
            .field("params", &self.inner.params)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::CONTENT_TYPE;

    fn request(uri: &str) -> Request {
        http::Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Bytes::new())
            .unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_request_id_generated() {
        let ctx = Context::new(request("/"), Params::new(), Services::empty());
        let id = ctx.request_id().as_str();
        assert!(Uuid::parse_str(id).is_ok());
        assert_eq!(Uuid::parse_str(id).unwrap().get_version_num(), 7);
    }

    #[test]
    fn test_request_id_reused() {
        let mut req = request("/");
        req.headers_mut()
            .insert(REQUEST_ID_HEADER, "trace-123".parse().unwrap());
        let ctx = Context::new(req, Params::new(), Services::empty());
        assert_eq!(ctx.request_id().as_str(), "trace-123");
    }

    #[test]
    fn test_request_id_empty_header_replaced() {
        let mut req = request("/");
        req.headers_mut()
            .insert(REQUEST_ID_HEADER, "".parse().unwrap());
        let ctx = Context::new(req, Params::new(), Services::empty());
        assert!(!ctx.request_id().as_str().is_empty());
    }

    #[test]
    fn test_request_id_keeps_inner_whitespace() {
        assert_eq!(
            RequestId::from_header(Some("trace 42")).as_str(),
            "trace 42"
        );
        assert_ne!(RequestId::from_header(Some("bad\nid")).as_str(), "bad\nid");
    }

    #[test]
    fn test_request_id_unique() {
        let a = RequestId::new();
        let b = RequestId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_path_query_params() {
        let ctx = Context::new(
            request("/cards/abc?page=2&holo=true"),
            params(&[("id", "abc")]),
            Services::empty(),
        );
        assert_eq!(ctx.method(), Method::GET);
        assert_eq!(ctx.path(), "/cards/abc");
        assert_eq!(ctx.params().get("id"), Some("abc"));
        assert_eq!(ctx.query().get_number::<u32>("page"), Some(2));
        assert!(ctx.query().get_bool("holo"));
    }

    #[test]
    fn test_json_helper() {
        let ctx = Context::new(request("/"), Params::new(), Services::empty());
        let response = ctx.json(&serde_json::json!({"id": "abc123"})).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(
            response.headers()[REQUEST_ID_HEADER],
            ctx.request_id().as_str()
        );
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["id"], "abc123");
    }

    #[test]
    fn test_not_found_helper() {
        let ctx = Context::new(request("/missing"), Params::new(), Services::empty());
        let response = ctx.not_found();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "error": { "code": "NOT_FOUND", "message": "Not Found", "status": 404 }
            })
        );
    }

    #[test]
    fn test_bad_request_helper() {
        let ctx = Context::new(request("/"), Params::new(), Services::empty());
        let response = ctx.bad_request("page must be positive");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["error"]["message"], "page must be positive");
    }

    #[test]
    fn test_json_body() {
        #[derive(Debug, Deserialize)]
        struct NewDeck {
            name: String,
        }

        let req = http::Request::builder()
            .method(Method::POST)
            .uri("/decks")
            .body(Bytes::from_static(br#"{"name":"Blaine"}"#))
            .unwrap();
        let ctx = Context::new(req, Params::new(), Services::empty());
        let deck: NewDeck = ctx.json_body().unwrap();
        assert_eq!(deck.name, "Blaine");

        let bad = Context::new(
            http::Request::builder()
                .uri("/decks")
                .body(Bytes::from_static(b"{"))
                .unwrap(),
            Params::new(),
            Services::empty(),
        );
        let err = bad.json_body::<NewDeck>().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_clone_shares_request() {
        let ctx = Context::new(request("/a"), Params::new(), Services::empty());
        let other = ctx.clone();
        assert_eq!(ctx.request_id(), other.request_id());
        assert!(std::ptr::eq(ctx.request(), other.request()));
    }
}
