//! Process bootstrap: wires state, registry and the three listeners together.
//!
//! Startup order:
//!
//! 1. runtime directory and pid file,
//! 2. route registry loaded from `routes.json`,
//! 3. management and static listeners on loopback ephemeral ports, each
//!    published as a discovery file and registered as a route,
//! 4. gateway port observers (reload, publish `gateway.url`, persist config),
//! 5. initial port assignment, which runs the full observer chain.
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use axum::Router;
use eyre::{Result, WrapErr, eyre};
use tokio::{net::TcpListener, sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    adapters::{
        auth::AuthGate,
        gateway::gateway_router,
        http_client::HttpClientAdapter,
        json_route_store::JsonRouteStore,
        listener_supervisor::{ListenerSupervisor, local_addr_for},
        management::{ManagementContext, PORT_PATH, management_router},
        static_files::{StartTime, static_router},
    },
    config::{
        GatewayConfig, GatewayConfigValidator, LoadedConfig, save_config,
        validation::validate_port,
    },
    core::{registry::RouteRegistry, route::Route, state::GatewayState},
    ports::http_client::HttpClient,
    tracing_setup::listener_span,
    utils::{
        GracefulShutdown,
        address_file::{
            GATEWAY_URL_FILENAME, MANAGEMENT_URL_FILENAME, STATIC_URL_FILENAME, cleanup_files,
            ensure_runtime_dir, publish_address, write_pid_file,
        },
        port_scan::find_available_port,
    },
};

/// A started gateway process. Dropping it does not stop anything; call
/// [`RunningGateway::stop`].
pub struct RunningGateway {
    pub registry: Arc<RouteRegistry>,
    pub state: Arc<GatewayState>,
    pub supervisor: Arc<ListenerSupervisor>,
    pub management_addr: SocketAddr,
    pub static_addr: SocketAddr,
    shutdown: GracefulShutdown,
    listeners: Vec<(&'static str, JoinHandle<()>)>,
    published: Vec<PathBuf>,
}

/// Start every listener described by `loaded` and assign the gateway port.
pub async fn start(loaded: LoadedConfig, shutdown: GracefulShutdown) -> Result<RunningGateway> {
    let LoadedConfig {
        config,
        path: config_path,
        ..
    } = loaded;
    GatewayConfigValidator::validate(&config).wrap_err("Invalid configuration")?;
    let supervisor_settings = config.supervisor_settings()?;

    let state = Arc::new(GatewayState::new(config.gateway_settings()));
    let runtime_path = state.runtime_path();
    ensure_runtime_dir(&runtime_path)
        .await
        .wrap_err_with(|| format!("Runtime path {} is not usable", runtime_path.display()))?;
    let mut published = vec![
        write_pid_file(&runtime_path)
            .await
            .wrap_err("Failed to write pid file")?,
    ];

    let http_client: Arc<dyn HttpClient> =
        Arc::new(HttpClientAdapter::new().wrap_err("Failed to create HTTP client adapter")?);
    let store = Arc::new(JsonRouteStore::in_runtime_dir(&runtime_path));
    let registry = Arc::new(RouteRegistry::load(store, http_client.clone()).await);

    let mut listeners = Vec::with_capacity(2);

    let management = management_router(
        ManagementContext {
            registry: registry.clone(),
            state: state.clone(),
        },
        AuthGate::from_token(config.auth_token()),
    );
    let (management_addr, handle) =
        spawn_local_listener("management", management, shutdown.token()).await?;
    listeners.push(("management", handle));
    let management_url = format!("http://{management_addr}");
    published.push(publish_address(&runtime_path, MANAGEMENT_URL_FILENAME, &management_url).await?);
    registry
        .create_route(Route::new(PORT_PATH, &management_url))
        .await
        .wrap_err("Failed to register the management port route")?;

    let www_path = state.www_path();
    if !www_path.is_dir() {
        tracing::warn!(
            path = %www_path.display(),
            "WWW path does not exist, static content will 404"
        );
    }
    let (static_addr, handle) = spawn_local_listener(
        "static",
        static_router(&www_path, StartTime::now()),
        shutdown.token(),
    )
    .await?;
    listeners.push(("static", handle));
    let static_url = format!("http://{static_addr}");
    published.push(publish_address(&runtime_path, STATIC_URL_FILENAME, &static_url).await?);
    registry
        .create_route(Route::new("/", &static_url))
        .await
        .wrap_err("Failed to register the static content route")?;

    let bind_host = supervisor_settings.bind_host;
    let supervisor = Arc::new(ListenerSupervisor::new(
        supervisor_settings,
        http_client,
        shutdown.token(),
    ));
    register_observers(&state, &registry, &supervisor, config, config_path).await;
    published.push(runtime_path.join(GATEWAY_URL_FILENAME));

    let port = match validate_port(&state.gateway_port())? {
        Some(port) => port,
        None => find_available_port(bind_host)
            .ok_or_else(|| eyre!("No available port for the gateway on {bind_host}"))?,
    };
    tracing::info!(port = %port, "Assigning gateway port");
    state
        .set_gateway_port(port.to_string())
        .await
        .wrap_err("Failed to start the gateway listener")?;

    Ok(RunningGateway {
        registry,
        state,
        supervisor,
        management_addr,
        static_addr,
        shutdown,
        listeners,
        published,
    })
}

/// Observers run in registration order: the listener is moved first so a
/// port that cannot be served is never published or persisted.
async fn register_observers(
    state: &GatewayState,
    registry: &Arc<RouteRegistry>,
    supervisor: &Arc<ListenerSupervisor>,
    config: GatewayConfig,
    config_path: PathBuf,
) {
    {
        let registry = registry.clone();
        let supervisor = supervisor.clone();
        state
            .on_gateway_port_change(move |port: String| {
                let registry = registry.clone();
                let supervisor = supervisor.clone();
                async move {
                    supervisor
                        .reload_gateway(&port, gateway_router(registry))
                        .await
                        .wrap_err("Failed to reload the gateway listener")
                }
            })
            .await;
    }

    {
        let supervisor = supervisor.clone();
        let runtime_path = state.runtime_path();
        state
            .on_gateway_port_change(move |_port: String| {
                let supervisor = supervisor.clone();
                let runtime_path = runtime_path.clone();
                async move {
                    let addr = supervisor
                        .current_addr()
                        .await
                        .ok_or_else(|| eyre!("Gateway listener is not running"))?;
                    publish_address(&runtime_path, GATEWAY_URL_FILENAME, &reachable_url(addr))
                        .await
                        .wrap_err("Failed to publish gateway address")?;
                    Ok::<(), eyre::Report>(())
                }
            })
            .await;
    }

    let persisted = Arc::new(Mutex::new(config));
    {
        let persisted = persisted.clone();
        let config_path = config_path.clone();
        state
            .on_gateway_port_change(move |port: String| {
                let persisted = persisted.clone();
                let config_path = config_path.clone();
                async move {
                    let mut config = persisted.lock().await;
                    config.gateway.port = port;
                    save_config(&config_path, &config).await
                }
            })
            .await;
    }
    state
        .on_runtime_path_change(move |path: PathBuf| {
            let persisted = persisted.clone();
            let config_path = config_path.clone();
            async move {
                let mut config = persisted.lock().await;
                config.common.runtime_path = path.to_string_lossy().into_owned();
                save_config(&config_path, &config).await
            }
        })
        .await;
}

/// URL a local process can use to reach a listener bound on `addr`.
pub fn reachable_url(addr: SocketAddr) -> String {
    format!("http://{}", local_addr_for(addr))
}

async fn spawn_local_listener(
    name: &'static str,
    router: Router,
    token: CancellationToken,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
        .await
        .wrap_err_with(|| format!("Failed to bind the {name} listener"))?;
    let addr = listener.local_addr()?;
    let span = listener_span(name, &addr);
    tracing::info!(parent: &span, "Listener started");

    let handle = tokio::spawn(
        async move {
            let service = router.into_make_service_with_connect_info::<SocketAddr>();
            let result = axum::serve(listener, service)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            match result {
                Ok(()) => tracing::info!("Listener stopped"),
                Err(e) => tracing::error!(error = %e, "Listener failed"),
            }
        }
        .instrument(span),
    );
    Ok((addr, handle))
}

impl RunningGateway {
    pub fn runtime_path(&self) -> PathBuf {
        self.state.runtime_path()
    }

    /// Cancel every listener, wait for the drains and remove published files.
    pub async fn stop(self) {
        if !self.shutdown.is_shutdown_initiated() {
            self.shutdown.trigger_shutdown();
        }
        self.supervisor.shutdown().await;
        for (label, handle) in self.listeners {
            self.shutdown.drain(label, handle).await;
        }
        cleanup_files(&self.published).await;
        tracing::info!("Gateway stopped");
    }
}

/// Run until SIGINT or SIGTERM.
pub async fn run(loaded: LoadedConfig) -> Result<()> {
    let shutdown = GracefulShutdown::with_timeout(loaded.config.shutdown_timeout());

    let signals = shutdown.clone();
    tokio::spawn(async move { signals.run_signal_handler().await });

    let gateway = match start(loaded, shutdown.clone()).await {
        Ok(gateway) => gateway,
        Err(e) => {
            shutdown.trigger_shutdown();
            return Err(e);
        }
    };
    tracing::info!(
        management = %gateway.management_addr,
        static_content = %gateway.static_addr,
        port = %gateway.state.gateway_port(),
        "Gateway is running"
    );

    shutdown.wait_for_shutdown_signal().await;
    gateway.stop().await;
    Ok(())
}
