//! Buffered responses with assertion helpers.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use kanto_core::{Response, REQUEST_ID_HEADER};
use serde::de::DeserializeOwned;

use crate::error::TestError;

/// A response returned by the [`TestClient`](crate::TestClient).
#[derive(Debug, Clone)]
pub struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl From<Response> for TestResponse {
    fn from(response: Response) -> Self {
        let (parts, body) = response.into_parts();
        Self {
            status: parts.status,
            headers: parts.headers,
            body,
        }
    }
}

impl TestResponse {
    /// Returns the status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header as a string, if present and visible ASCII.
    #[must_use]
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the `x-request-id` header.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.header_str(REQUEST_ID_HEADER)
    }

    /// Returns the raw body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::BodyRead`] if the body is not UTF-8.
    pub fn text(&self) -> Result<String, TestError> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| TestError::BodyRead(format!("invalid UTF-8: {e}")))
    }

    /// Deserializes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::Json`] if the body does not deserialize.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TestError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Deserializes the body as a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::Json`] if the body is not JSON.
    pub fn json_value(&self) -> Result<serde_json::Value, TestError> {
        self.json()
    }

    /// Returns `error.code` from an error envelope.
    #[must_use]
    pub fn error_code(&self) -> Option<String> {
        let body = self.json_value().ok()?;
        body["error"]["code"].as_str().map(str::to_string)
    }

    /// Asserts the status.
    ///
    /// # Panics
    ///
    /// Panics if the status differs.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "expected status {expected}, got {} with body {}",
            self.status,
            String::from_utf8_lossy(&self.body)
        );
        self
    }

    /// Asserts a header value.
    ///
    /// # Panics
    ///
    /// Panics if the header is missing or differs.
    pub fn assert_header(&self, name: &str, expected: &str) -> &Self {
        let actual = self
            .header_str(name)
            .unwrap_or_else(|| panic!("header '{name}' not found"));
        assert_eq!(actual, expected, "header '{name}'");
        self
    }

    /// Asserts that the body is an error envelope with `code`.
    ///
    /// # Panics
    ///
    /// Panics if the body is not an envelope or the code differs.
    pub fn assert_error_code(&self, code: &str) -> &Self {
        assert_eq!(
            self.error_code().as_deref(),
            Some(code),
            "body: {}",
            String::from_utf8_lossy(&self.body)
        );
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: StatusCode, body: &'static str) -> TestResponse {
        let response = http::Response::builder()
            .status(status)
            .header(REQUEST_ID_HEADER, "req-1")
            .body(Bytes::from_static(body.as_bytes()))
            .unwrap();
        TestResponse::from(response)
    }

    #[test]
    fn test_accessors() {
        let response = response(StatusCode::OK, "hello");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.request_id(), Some("req-1"));
        assert_eq!(response.text().unwrap(), "hello");
        assert!(response.json_value().is_err());
    }

    #[test]
    fn test_error_code() {
        let response = response(
            StatusCode::NOT_FOUND,
            r#"{"error":{"code":"NOT_FOUND","message":"Not Found","status":404}}"#,
        );
        response
            .assert_status(StatusCode::NOT_FOUND)
            .assert_error_code("NOT_FOUND")
            .assert_header(REQUEST_ID_HEADER, "req-1");
    }

    #[test]
    #[should_panic(expected = "expected status")]
    fn test_assert_status_panics() {
        response(StatusCode::OK, "").assert_status(StatusCode::CREATED);
    }

    #[test]
    fn test_invalid_utf8() {
        let response = TestResponse::from(
            http::Response::builder()
                .body(Bytes::from_static(&[0xff, 0xfe]))
                .unwrap(),
        );
        assert!(matches!(response.text(), Err(TestError::BodyRead(_))));
    }
}
