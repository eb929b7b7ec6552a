//! Fixed-window rate limiting.
//!
//! Each client key gets `limit` requests per `window`. Requests over the
//! limit never reach the handler: they fail with
//! [`KantoError::RateLimited`], which the dispatcher renders as a `429`
//! envelope with a `retry-after` header. Allowed responses carry
//! `x-ratelimit-limit` and `x-ratelimit-remaining`.
//!
//! Expired windows are swept whenever the number of tracked clients
//! doubles, so rotating client keys cannot grow memory without bound.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use kanto_middleware::stages::RateLimit;
//!
//! // 60 requests per minute per API key
//! let limiter = RateLimit::builder()
//!     .limit(60)
//!     .window(Duration::from_secs(60))
//!     .per_header("x-api-key")
//!     .build();
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::HeaderValue;
use kanto_core::{BoxFuture, Context, KantoError, KantoResult, Response};
use parking_lot::Mutex;

use crate::middleware::{Middleware, Next};

/// Rate limit header names.
pub mod headers {
    /// Requests allowed per window.
    pub const LIMIT: &str = "x-ratelimit-limit";
    /// Requests left in the current window.
    pub const REMAINING: &str = "x-ratelimit-remaining";
}

/// Key used when the client cannot be identified.
const ANONYMOUS_KEY: &str = "anonymous";

/// Tracked clients before the first sweep of expired windows.
const SWEEP_THRESHOLD: usize = 1024;

/// How the client key is derived from a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KeyStrategy {
    /// First `x-forwarded-for` hop, then `x-real-ip`.
    #[default]
    ClientIp,
    /// The value of a header, such as an API key.
    Header(String),
    /// One shared budget for every request.
    Global,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u64,
}

#[derive(Debug)]
struct Windows {
    entries: HashMap<String, Window>,
    sweep_at: usize,
}

impl Windows {
    fn new(sweep_threshold: usize) -> Self {
        Self {
            entries: HashMap::new(),
            sweep_at: sweep_threshold,
        }
    }

    fn sweep(&mut self, now: Instant, window: Duration, floor: usize) {
        let before = self.entries.len();
        self.entries
            .retain(|_, w| now.duration_since(w.started) < window);
        self.sweep_at = floor.max(self.entries.len() * 2);
        tracing::debug!(
            removed = before - self.entries.len(),
            tracked = self.entries.len(),
            "swept expired rate limit windows"
        );
    }
}

/// Rate limit middleware.
///
/// Clones share the same counters.
#[derive(Debug, Clone)]
pub struct RateLimit {
    limit: u64,
    window: Duration,
    strategy: KeyStrategy,
    sweep_threshold: usize,
    windows: Arc<Mutex<Windows>>,
}

enum Decision {
    Allowed { remaining: u64 },
    Limited { retry_after: Duration },
}

impl RateLimit {
    /// Creates a builder (100 requests per minute per client IP).
    #[must_use]
    pub fn builder() -> RateLimitBuilder {
        RateLimitBuilder::default()
    }

    fn key(&self, ctx: &Context) -> String {
        let key = match &self.strategy {
            KeyStrategy::ClientIp => ctx
                .header("x-forwarded-for")
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .or_else(|| ctx.header("x-real-ip")),
            KeyStrategy::Header(name) => ctx.header(name),
            KeyStrategy::Global => None,
        };
        key.unwrap_or(ANONYMOUS_KEY).to_string()
    }

    fn check(&self, key: String, now: Instant) -> Decision {
        let mut windows = self.windows.lock();
        if windows.entries.len() >= windows.sweep_at && !windows.entries.contains_key(&key) {
            windows.sweep(now, self.window, self.sweep_threshold);
        }
        let window = windows.entries.entry(key).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }

        if window.count >= self.limit {
            let retry_after = self.window.saturating_sub(now.duration_since(window.started));
            return Decision::Limited { retry_after };
        }

        window.count += 1;
        Decision::Allowed {
            remaining: self.limit - window.count,
        }
    }
}

impl Middleware for RateLimit {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn process<'a>(&'a self, ctx: Context, next: Next) -> BoxFuture<'a, KantoResult<Response>> {
        Box::pin(async move {
            let key = self.key(&ctx);
            match self.check(key, Instant::now()) {
                Decision::Limited { retry_after } => {
                    tracing::debug!(request_id = %ctx.request_id(), "rate limit exceeded");
                    Err(KantoError::rate_limited(
                        "Too many requests",
                        Some(retry_after.as_secs().max(1)),
                    ))
                }
                Decision::Allowed { remaining } => {
                    let mut response = next.run(ctx).await?;
                    let headers = response.headers_mut();
                    headers.insert(headers::LIMIT, HeaderValue::from(self.limit));
                    headers.insert(headers::REMAINING, HeaderValue::from(remaining));
                    Ok(response)
                }
            }
        })
    }
}

/// Builder for [`RateLimit`].
#[derive(Debug, Clone)]
pub struct RateLimitBuilder {
    limit: u64,
    window: Duration,
    strategy: KeyStrategy,
}

impl Default for RateLimitBuilder {
    fn default() -> Self {
        Self {
            limit: 100,
            window: Duration::from_secs(60),
            strategy: KeyStrategy::ClientIp,
        }
    }
}

impl RateLimitBuilder {
    /// Sets the number of requests allowed per window.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the window length.
    #[must_use]
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Keys clients by IP address.
    #[must_use]
    pub fn per_ip(mut self) -> Self {
        self.strategy = KeyStrategy::ClientIp;
        self
    }

    /// Keys clients by a header value.
    #[must_use]
    pub fn per_header(mut self, name: impl Into<String>) -> Self {
        self.strategy = KeyStrategy::Header(name.into());
        self
    }

    /// Uses one budget for all clients.
    #[must_use]
    pub fn global(mut self) -> Self {
        self.strategy = KeyStrategy::Global;
        self
    }

    /// Builds the middleware.
    #[must_use]
    pub fn build(self) -> RateLimit {
        RateLimit {
            limit: self.limit,
            window: self.window,
            strategy: self.strategy,
            sweep_threshold: SWEEP_THRESHOLD,
            windows: Arc::new(Mutex::new(Windows::new(SWEEP_THRESHOLD))),
        }
    }
}
