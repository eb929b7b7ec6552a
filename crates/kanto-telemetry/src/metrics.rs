//! Prometheus metrics.
//!
//! [`init_metrics`] installs the global `metrics` recorder backed by
//! `metrics-exporter-prometheus`. Scrapes are served either by the
//! exporter's own listener ([`MetricsConfig::listen_addr`]) or by mounting
//! [`scrape`] as a route on the application.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `kanto_http_requests_total` | Counter | `method`, `status` |
//! | `kanto_http_request_duration_seconds` | Histogram | `method` |

use std::net::SocketAddr;
use std::sync::OnceLock;

use kanto_core::{Context, KantoError, KantoResult, Response};
use kanto_middleware::stages::logger::{REQUEST_DURATION, REQUESTS_TOTAL};
use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::error::TelemetryError;
use crate::TelemetryResult;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    /// Whether a recorder is installed.
    pub enabled: bool,

    /// Address for the exporter's own scrape listener, e.g. `0.0.0.0:9090`.
    ///
    /// `None` installs the recorder only; mount [`scrape`] to expose it.
    pub listen_addr: Option<String>,

    /// Path the application mounts [`scrape`] on.
    pub path: String,

    /// Histogram buckets for request duration, in seconds.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: None,
            path: "/metrics".to_string(),
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        }
    }
}

/// Installs the global Prometheus recorder.
///
/// With a [`listen_addr`](MetricsConfig::listen_addr) the exporter's
/// listener is spawned on the current Tokio runtime.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidAddress`] for an unparsable listen
/// address and [`TelemetryError::MetricsInit`] if the recorder cannot be
/// built or another recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let listen_addr = config
        .listen_addr
        .as_deref()
        .map(|addr| {
            addr.parse::<SocketAddr>()
                .map_err(|e| TelemetryError::InvalidAddress(format!("{addr}: {e}")))
        })
        .transpose()?;

    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(REQUEST_DURATION.to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let handle = match listen_addr {
        None => builder
            .install_recorder()
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?,
        Some(addr) => {
            let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
                TelemetryError::MetricsInit(format!("scrape listener needs a Tokio runtime: {e}"))
            })?;
            let (recorder, exporter) = {
                let _entered = runtime.enter();
                builder
                    .with_http_listener(addr)
                    .build()
                    .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?
            };
            let handle = recorder.handle();
            metrics::set_global_recorder(recorder).map_err(|_| {
                TelemetryError::MetricsInit("a metrics recorder is already installed".to_string())
            })?;
            runtime.spawn(async move {
                if let Err(error) = exporter.await {
                    tracing::warn!(error = ?error, "metrics listener stopped");
                }
            });
            tracing::info!(addr = %addr, "metrics listener started");
            handle
        }
    };

    let _ = METRICS_HANDLE.set(handle);
    describe_metrics();
    Ok(())
}

/// Renders all metrics in Prometheus text format.
///
/// Returns `None` if [`init_metrics`] has not installed a recorder.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

/// Handler serving the Prometheus text format.
///
/// # Errors
///
/// Fails with `503` while no recorder is installed.
pub async fn scrape(ctx: Context) -> KantoResult<Response> {
    render_metrics()
        .map(|body| ctx.text(body))
        .ok_or_else(|| KantoError::unavailable("metrics are not enabled"))
}

fn describe_metrics() {
    describe_counter!(REQUESTS_TOTAL, Unit::Count, "Completed HTTP requests");
    describe_histogram!(
        REQUEST_DURATION,
        Unit::Seconds,
        "HTTP request duration in seconds"
    );
}
