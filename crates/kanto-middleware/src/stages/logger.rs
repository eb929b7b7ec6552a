//! Request logging and HTTP metrics.
//!
//! Emits one `tracing` event per request and records:
//!
//! - `kanto_http_requests_total` (counter; `method`, `status`)
//! - `kanto_http_request_duration_seconds` (histogram; `method`)
//!
//! Metrics go to whatever recorder is installed; without one they are no-ops.

use kanto_core::{BoxFuture, Context, KantoResult, Response};

use crate::middleware::{Middleware, Next};

/// Counter of completed requests.
pub const REQUESTS_TOTAL: &str = "kanto_http_requests_total";

/// Histogram of request durations in seconds.
pub const REQUEST_DURATION: &str = "kanto_http_request_duration_seconds";

/// Logs every request once it completes.
///
/// Server errors are logged at `warn`, everything else at `info`.
#[derive(Debug, Clone, Default)]
pub struct RequestLogger {
    skip_paths: Vec<String>,
}

impl RequestLogger {
    /// Creates a logger that logs every path.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Does not log requests for `path` (metrics are still recorded).
    #[must_use]
    pub fn skip_path(mut self, path: impl Into<String>) -> Self {
        self.skip_paths.push(path.into());
        self
    }
}

impl Middleware for RequestLogger {
    fn name(&self) -> &'static str {
        "request_logger"
    }

    fn process<'a>(&'a self, ctx: Context, next: Next) -> BoxFuture<'a, KantoResult<Response>> {
        Box::pin(async move {
            let result = next.run(ctx.clone()).await;

            let status = match &result {
                Ok(response) => response.status(),
                Err(error) => error.status_code(),
            };
            let elapsed = ctx.elapsed();
            let method = ctx.method().as_str().to_string();

            metrics::counter!(
                REQUESTS_TOTAL,
                "method" => method.clone(),
                "status" => status.as_str().to_string()
            )
            .increment(1);
            metrics::histogram!(REQUEST_DURATION, "method" => method)
                .record(elapsed.as_secs_f64());

            if self.skip_paths.iter().any(|p| p == ctx.path()) {
                return result;
            }

            #[allow(clippy::cast_possible_truncation)]
            let duration_ms = elapsed.as_millis() as u64;
            if status.is_server_error() {
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    http.method = %ctx.method(),
                    http.path = ctx.path(),
                    http.status = status.as_u16(),
                    duration_ms,
                    "request failed"
                );
            } else {
                tracing::info!(
                    request_id = %ctx.request_id(),
                    http.method = %ctx.method(),
                    http.path = ctx.path(),
                    http.status = status.as_u16(),
                    duration_ms,
                    "request completed"
                );
            }

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::get;
    use crate::Pipeline;
    use kanto_core::KantoError;

    #[tokio::test]
    async fn test_logger_passes_response_through() {
        let pipeline = Pipeline::builder()
            .layer(RequestLogger::new())
            .handler(|ctx: Context| async move { Ok(ctx.text("ok")) });

        let response = pipeline.run(get("/cards")).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"ok");
    }

    #[tokio::test]
    async fn test_logger_passes_errors_through() {
        let pipeline = Pipeline::builder()
            .layer(RequestLogger::new().skip_path("/health"))
            .handler(|_ctx: Context| async move {
                Err::<Response, _>(KantoError::internal("boom"))
            });

        let err = pipeline.run(get("/health")).await.unwrap_err();
        assert!(err.is_internal());
    }
}
