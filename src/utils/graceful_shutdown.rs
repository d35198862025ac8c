use std::{future::Future, time::Duration};

use tokio::{signal, time::timeout};
use tokio_util::sync::CancellationToken;

/// Default bound on how long listeners may take to drain.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Process-wide shutdown coordination.
///
/// Owns the root [`CancellationToken`]. Listener tasks hold child tokens and
/// stop accepting once it is cancelled, either by an OS signal or by
/// [`GracefulShutdown::trigger_shutdown`].
#[derive(Clone)]
pub struct GracefulShutdown {
    root: CancellationToken,
    shutdown_timeout: Duration,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_SHUTDOWN_TIMEOUT)
    }

    pub fn with_timeout(shutdown_timeout: Duration) -> Self {
        Self {
            root: CancellationToken::new(),
            shutdown_timeout,
        }
    }

    /// A token cancelled together with the whole process.
    pub fn token(&self) -> CancellationToken {
        self.root.child_token()
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.root.is_cancelled()
    }

    pub fn trigger_shutdown(&self) {
        if self.root.is_cancelled() {
            tracing::warn!("Shutdown already initiated, ignoring request");
            return;
        }
        tracing::info!("Shutdown triggered");
        self.root.cancel();
    }

    /// Wait for SIGINT or SIGTERM, then cancel the root token.
    ///
    /// Returns early without a signal if shutdown is triggered elsewhere.
    pub async fn run_signal_handler(&self) {
        tracing::info!("Signal handler started. Listening for SIGTERM and SIGINT");

        tokio::select! {
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => {
                        tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...")
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to listen for SIGINT, shutting down")
                    }
                }
                self.trigger_shutdown();
            }
            _ = wait_for_sigterm() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                self.trigger_shutdown();
            }
            _ = self.root.cancelled() => {}
        }
    }

    pub async fn wait_for_shutdown_signal(&self) {
        self.root.cancelled().await;
    }

    /// Await `task` for at most the shutdown timeout.
    ///
    /// Returns `false` (and logs) when the window expires. Nothing is retried.
    pub async fn drain<F>(&self, label: &str, task: F) -> bool
    where
        F: Future,
    {
        match timeout(self.shutdown_timeout, task).await {
            Ok(_) => {
                tracing::info!(listener = label, "Listener drained");
                true
            }
            Err(_) => {
                tracing::error!(
                    listener = label,
                    timeout = ?self.shutdown_timeout,
                    "Listener did not finish within the shutdown timeout"
                );
                false
            }
        }
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to register SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    // Only Ctrl+C is available here.
    std::future::pending::<()>().await;
}
