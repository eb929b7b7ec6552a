//! HTTP/1 hosting on top of hyper.
//!
//! Bodies are buffered up to [`ServerConfig::max_body_bytes`] before the
//! request reaches [`App::handle`].
//!
//! [`ServerConfig::max_body_bytes`]: crate::ServerConfig::max_body_bytes

use std::convert::Infallible;
use std::error::Error as StdError;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use kanto_core::{response, ErrorEnvelope, RequestId, Response, REQUEST_ID_HEADER};
use tokio::net::{TcpListener, TcpStream};

use crate::app::App;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Accepts connections until `shutdown` fires, then drains them.
pub(crate) async fn serve(app: Arc<App>, listener: TcpListener, shutdown: ShutdownSignal) {
    let tracker = ConnectionTracker::new();
    let stop = shutdown.wait();
    tokio::pin!(stop);

    loop {
        tokio::select! {
            () = &mut stop => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    let token = tracker.acquire();
                    let app = Arc::clone(&app);
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(error) = serve_connection(app, stream, shutdown).await {
                            tracing::debug!(remote = %remote, error = %error, "connection error");
                        }
                        drop(token);
                    });
                }
                Err(error) => {
                    tracing::warn!(error = %error, "failed to accept connection");
                }
            },
        }
    }
    drop(listener);

    let timeout = app.config().shutdown_timeout();
    tracing::info!(active = tracker.active(), "draining connections");
    if !tracker.drain(timeout).await {
        tracing::warn!(
            remaining = tracker.active(),
            timeout_secs = timeout.as_secs(),
            "connection drain timed out"
        );
    }
}

async fn serve_connection(
    app: Arc<App>,
    stream: TcpStream,
    shutdown: ShutdownSignal,
) -> Result<(), hyper::Error> {
    let keep_alive = app.config().keep_alive();
    let service = service_fn(move |request: http::Request<Incoming>| {
        let app = Arc::clone(&app);
        async move { Ok::<_, Infallible>(dispatch(&app, request).await) }
    });

    let connection = http1::Builder::new()
        .keep_alive(keep_alive)
        .serve_connection(TokioIo::new(stream), service);
    tokio::pin!(connection);
    let stop = shutdown.wait();
    tokio::pin!(stop);

    tokio::select! {
        result = connection.as_mut() => result,
        () = &mut stop => {
            // Finish the in-flight request, then close.
            connection.as_mut().graceful_shutdown();
            connection.as_mut().await
        }
    }
}

async fn dispatch(app: &App, request: http::Request<Incoming>) -> http::Response<Full<Bytes>> {
    let (parts, body) = request.into_parts();
    let response = match Limited::new(body, app.config().max_body_bytes())
        .collect()
        .await
    {
        Ok(collected) => {
            app.handle(http::Request::from_parts(parts, collected.to_bytes()))
                .await
        }
        Err(error) => body_error(&parts.headers, error.as_ref()),
    };
    response.map(Full::new)
}

fn body_error(headers: &HeaderMap, error: &(dyn StdError + Send + Sync + 'static)) -> Response {
    let request_id = RequestId::from_header(
        headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok()),
    );
    let (status, code, message) = if error.is::<LengthLimitError>() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            "PAYLOAD_TOO_LARGE",
            "Request body too large",
        )
    } else {
        (
            StatusCode::BAD_REQUEST,
            "BAD_REQUEST",
            "Failed to read request body",
        )
    };
    tracing::debug!(request_id = %request_id, error = %error, "rejected request body");
    response::envelope(
        status,
        &ErrorEnvelope::new(status, code, message),
        request_id.as_str(),
    )
}
