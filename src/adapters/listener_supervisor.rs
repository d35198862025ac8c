//! Supervisor of the public gateway listener.
//!
//! A port change is a bind, verify, drain sequence:
//!
//! 1. bind the new address (failure leaves the current listener alone),
//! 2. serve it on its own task,
//! 3. probe `GET /ping` on the bound host (loopback for wildcard binds) until
//!    it answers or the attempt budget runs out (in which case the new
//!    listener is closed again),
//! 4. make it current and retire the previous one after a grace delay.
//!
//! There is never a moment without a serving listener. For a short while two
//! may be bound to different ports.
use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use axum::Router;
use tokio::{net::TcpListener, sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    core::error::{GatewayError, GatewayResult},
    ports::http_client::HttpClient,
};

/// Timing and address knobs of the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    pub bind_host: IpAddr,
    pub probe_attempts: u32,
    pub probe_interval: Duration,
    pub probe_timeout: Duration,
    pub grace_delay: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            probe_attempts: 10,
            probe_interval: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(1),
            grace_delay: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// A bound and serving listener.
struct ListenerHandle {
    addr: SocketAddr,
    generation: u64,
    token: CancellationToken,
    server: JoinHandle<()>,
}

/// A listener waiting out its grace delay before it closes.
struct RetiringHandle {
    addr: SocketAddr,
    token: CancellationToken,
    drain: JoinHandle<()>,
}

pub struct ListenerSupervisor {
    settings: SupervisorSettings,
    client: Arc<dyn HttpClient>,
    shutdown: CancellationToken,
    current: Mutex<Option<ListenerHandle>>,
    retiring: Mutex<Option<RetiringHandle>>,
    generations: AtomicU64,
}

impl ListenerSupervisor {
    /// `shutdown` is the parent of every listener's token. Cancelling it
    /// stops all listeners this supervisor started.
    pub fn new(
        settings: SupervisorSettings,
        client: Arc<dyn HttpClient>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            settings,
            client,
            shutdown,
            current: Mutex::new(None),
            retiring: Mutex::new(None),
            generations: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    pub async fn current_addr(&self) -> Option<SocketAddr> {
        self.current.lock().await.as_ref().map(|h| h.addr)
    }

    /// Generation of the current listener, `0` before the first reload.
    pub async fn current_generation(&self) -> u64 {
        self.current
            .lock()
            .await
            .as_ref()
            .map_or(0, |h| h.generation)
    }

    pub async fn retiring_addr(&self) -> Option<SocketAddr> {
        self.retiring
            .lock()
            .await
            .as_ref()
            .filter(|r| !r.drain.is_finished())
            .map(|r| r.addr)
    }

    pub fn bind_addr(&self, port: &str) -> GatewayResult<SocketAddr> {
        let host = self.settings.bind_host;
        let port: u16 = port
            .trim()
            .parse()
            .map_err(|_| GatewayError::InvalidAddress(format!("{host}:{port}")))?;
        Ok(SocketAddr::new(host, port))
    }

    /// Move the public listener to `port`, serving `router`.
    ///
    /// Reloading onto the address that is already current does nothing.
    pub async fn reload_gateway(&self, port: &str, router: Router) -> GatewayResult<()> {
        let addr = self.bind_addr(port)?;

        let mut current = self.current.lock().await;
        if current.as_ref().is_some_and(|h| h.addr == addr) {
            tracing::info!(%addr, "Port is the same as the running gateway, no change required");
            return Ok(());
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| GatewayError::BindFailure { addr, source })?;
        let local_addr = listener.local_addr().unwrap_or(addr);
        tracing::info!(addr = %local_addr, "Gateway listener bound");

        let token = self.shutdown.child_token();
        let server = spawn_server(listener, router, token.clone(), local_addr);

        if let Err(e) = self.await_healthy(local_addr).await {
            tracing::error!(
                addr = %local_addr,
                error = %e,
                "New gateway listener failed its probe, keeping the current one"
            );
            token.cancel();
            if tokio::time::timeout(self.settings.shutdown_timeout, server)
                .await
                .is_err()
            {
                tracing::warn!(addr = %local_addr, "Aborted listener did not stop in time");
            }
            return Err(e);
        }

        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = current.replace(ListenerHandle {
            addr,
            generation,
            token,
            server,
        });
        drop(current);
        tracing::info!(addr = %local_addr, generation, "Gateway listener is now current");

        if let Some(previous) = previous {
            self.retire(previous).await;
        }

        Ok(())
    }

    async fn await_healthy(&self, addr: SocketAddr) -> GatewayResult<()> {
        let url = format!("http://{}/ping", local_addr_for(addr));
        let attempts = self.settings.probe_attempts.max(1);

        for attempt in 1..=attempts {
            match self.client.probe(&url, self.settings.probe_timeout).await {
                Ok(true) => {
                    tracing::debug!(%url, attempt, "Gateway listener is answering");
                    return Ok(());
                }
                Ok(false) => tracing::debug!(%url, attempt, "Gateway listener not healthy yet"),
                Err(e) => tracing::debug!(%url, attempt, error = %e, "Gateway probe failed"),
            }
            if attempt < attempts {
                tokio::time::sleep(self.settings.probe_interval).await;
            }
        }

        Err(GatewayError::GatewayNotResponding { addr, attempts })
    }

    async fn retire(&self, previous: ListenerHandle) {
        let grace = self.settings.grace_delay;
        let drain_timeout = self.settings.shutdown_timeout;
        let ListenerHandle {
            addr,
            generation,
            token,
            server,
        } = previous;
        tracing::info!(%addr, generation, ?grace, "Retiring previous gateway listener");

        let drain = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(grace) => {}
                    _ = token.cancelled() => {}
                }
                token.cancel();
                match tokio::time::timeout(drain_timeout, server).await {
                    Ok(_) => tracing::info!(%addr, generation, "Previous gateway listener closed"),
                    Err(_) => tracing::warn!(
                        %addr,
                        generation,
                        "Previous gateway listener did not drain in time"
                    ),
                }
            })
        };

        let mut retiring = self.retiring.lock().await;
        if let Some(older) = retiring.replace(RetiringHandle { addr, token, drain }) {
            // Only one listener waits out a grace delay at a time.
            older.token.cancel();
        }
    }

    /// Stop the current and any retiring listener, bounded by the shutdown timeout.
    pub async fn shutdown(&self) {
        let current = self.current.lock().await.take();
        let retiring = self.retiring.lock().await.take();

        if let Some(handle) = current {
            handle.token.cancel();
            match tokio::time::timeout(self.settings.shutdown_timeout, handle.server).await {
                Ok(_) => tracing::info!(addr = %handle.addr, "Gateway listener stopped"),
                Err(_) => tracing::error!(
                    addr = %handle.addr,
                    timeout = ?self.settings.shutdown_timeout,
                    "Gateway listener did not stop within the shutdown timeout"
                ),
            }
        }

        if let Some(retiring) = retiring {
            retiring.token.cancel();
            if tokio::time::timeout(self.settings.shutdown_timeout, retiring.drain)
                .await
                .is_err()
            {
                tracing::error!(
                    addr = %retiring.addr,
                    "Retiring gateway listener did not stop in time"
                );
            }
        }
    }
}

/// Address a local process dials to reach a listener bound on `addr`.
/// Wildcard binds are reached over loopback of the same family.
pub fn local_addr_for(addr: SocketAddr) -> SocketAddr {
    let host = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(host, addr.port())
}

fn spawn_server(
    listener: TcpListener,
    router: Router,
    token: CancellationToken,
    addr: SocketAddr,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let service = router.into_make_service_with_connect_info::<SocketAddr>();
        let result = axum::serve(listener, service)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await;
        if let Err(e) = result {
            tracing::error!(%addr, error = %e, "Gateway listener failed");
        }
    })
}
