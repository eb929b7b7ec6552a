//! Response builders shared by [`Context`](crate::Context) and the dispatcher.
//!
//! Every builder stamps the `x-request-id` header.

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use serde::Serialize;

use crate::context::REQUEST_ID_HEADER;
use crate::error::{ErrorEnvelope, KantoError, KantoResult};
use crate::handler::Response;

/// `application/json` content type.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// `text/plain; charset=utf-8` content type.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Serializes `value` into a JSON response.
pub fn json<T: Serialize + ?Sized>(
    status: StatusCode,
    value: &T,
    request_id: &str,
) -> KantoResult<Response> {
    let body = serde_json::to_vec(value)?;
    Ok(build(status, Some(JSON_CONTENT_TYPE), Bytes::from(body), request_id))
}

/// Builds a plain text response.
#[must_use]
pub fn text(status: StatusCode, body: impl Into<String>, request_id: &str) -> Response {
    build(
        status,
        Some(TEXT_CONTENT_TYPE),
        Bytes::from(body.into()),
        request_id,
    )
}

/// Builds a response without a body.
#[must_use]
pub fn empty(status: StatusCode, request_id: &str) -> Response {
    build(status, None, Bytes::new(), request_id)
}

/// Builds an error envelope response.
#[must_use]
pub fn envelope(status: StatusCode, envelope: &ErrorEnvelope, request_id: &str) -> Response {
    let body = serde_json::to_vec(envelope).unwrap_or_default();
    build(status, Some(JSON_CONTENT_TYPE), Bytes::from(body), request_id)
}

/// Builds the envelope response for a [`KantoError`].
///
/// Rate limited errors also carry a `retry-after` header.
#[must_use]
pub fn from_error(error: &KantoError, request_id: &str) -> Response {
    let mut response = envelope(error.status_code(), &error.to_envelope(), request_id);
    if let KantoError::RateLimited {
        retry_after_seconds: Some(seconds),
        ..
    } = error
    {
        response
            .headers_mut()
            .insert(http::header::RETRY_AFTER, HeaderValue::from(*seconds));
    }
    response
}

/// Sets `x-request-id` on a response unless it is already present.
pub fn ensure_request_id(response: &mut Response, request_id: &str) {
    if response.headers().contains_key(REQUEST_ID_HEADER) {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
}

fn build(
    status: StatusCode,
    content_type: Option<&'static str>,
    body: Bytes,
    request_id: &str,
) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    if let Some(content_type) = content_type {
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    ensure_request_id(&mut response, request_id);
    response
}
