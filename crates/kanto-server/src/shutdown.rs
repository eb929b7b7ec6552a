//! Graceful shutdown coordination.
//!
//! [`ShutdownSignal`] is a clonable trigger shared by the accept loop,
//! every open connection and any caller holding [`App::shutdown_handle`].
//! [`ConnectionTracker`] counts live connections so the server can drain
//! them before the container is stopped.
//!
//! [`App::shutdown_handle`]: crate::App::shutdown_handle
//!
//! # Example
//!
//! ```rust
//! use kanto_server::ShutdownSignal;
//!
//! # tokio_test::block_on(async {
//! let signal = ShutdownSignal::new();
//! let waiter = signal.wait();
//!
//! assert!(signal.trigger());
//! assert!(!signal.trigger());
//! waiter.await;
//! assert!(signal.is_shutdown());
//! # });
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

/// Shared, idempotent shutdown trigger.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    /// Creates an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Triggers shutdown.
    ///
    /// Returns `true` only for the call that flipped the signal.
    pub fn trigger(&self) -> bool {
        let flipped = self.tx.send_if_modified(|triggered| {
            if *triggered {
                false
            } else {
                *triggered = true;
                true
            }
        });
        if flipped {
            tracing::info!("shutdown requested");
        }
        flipped
    }

    /// Returns whether shutdown has been triggered.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    /// Returns a future that completes once shutdown is triggered.
    ///
    /// The future observes triggers that happened before it was created.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            // Every clone of the signal is gone, so nothing can trigger it.
            if rx.wait_for(|triggered| *triggered).await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Spawns a task that triggers this signal on SIGTERM or SIGINT.
    ///
    /// Failing to install the handlers is logged and leaves the signal
    /// untouched.
    pub fn watch_os_signals(&self) -> JoinHandle<()> {
        let signal = self.clone();
        tokio::spawn(async move {
            match wait_for_os_signal().await {
                Ok(name) => {
                    tracing::info!(signal = name, "received shutdown signal");
                    signal.trigger();
                }
                Err(error) => {
                    tracing::warn!(error = %error, "failed to install OS signal handlers");
                }
            }
        })
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_os_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = terminate.recv() => Ok("SIGTERM"),
        _ = interrupt.recv() => Ok("SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_os_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}

/// Counts live connections.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    active: AtomicUsize,
    idle: Notify,
}

impl ConnectionTracker {
    /// Creates a tracker with no connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection. It is released when the token drops.
    #[must_use]
    pub fn acquire(&self) -> ConnectionToken {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        ConnectionToken {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Returns the number of live connections.
    #[must_use]
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Waits until no connections remain.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Waits until no connections remain or `timeout` elapses.
    ///
    /// Returns `true` if every connection finished in time.
    pub async fn drain(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_idle()).await.is_ok()
    }
}

/// Keeps a connection counted while alive.
#[derive(Debug)]
pub struct ConnectionToken {
    inner: Arc<TrackerInner>,
}

impl Drop for ConnectionToken {
    fn drop(&mut self) {
        if self.inner.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}
