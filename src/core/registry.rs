//! The route registry: an in-memory `path -> target` table, the proxy
//! handlers derived from it, and its durable projection through a
//! [`RouteStore`].
//!
//! Lookups use longest-prefix matching. The candidate order (paths sorted by
//! descending length) is computed once per mutation and published together
//! with the table, so readers never sort and never observe a half-applied
//! registration.
use std::{collections::HashMap, sync::Arc};

use arc_swap::ArcSwap;
use tokio::sync::Mutex;

use crate::{
    core::{
        error::GatewayResult,
        proxy::ProxyHandler,
        route::{Route, RouteTarget},
    },
    ports::{
        http_client::HttpClient,
        route_store::{RouteStore, RouteTable},
    },
};

/// Immutable view of the registry published to readers.
#[derive(Default)]
struct RouteSnapshot {
    routes: RouteTable,
    proxies: HashMap<String, Arc<ProxyHandler>>,
    /// Registered paths, longest first.
    order: Vec<String>,
}

impl RouteSnapshot {
    fn build(routes: RouteTable, proxies: HashMap<String, Arc<ProxyHandler>>) -> Self {
        let mut order: Vec<String> = routes.keys().cloned().collect();
        // Ties are broken lexically so the order is stable across rebuilds.
        order.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        Self {
            routes,
            proxies,
            order,
        }
    }
}

pub struct RouteRegistry {
    store: Arc<dyn RouteStore>,
    client: Arc<dyn HttpClient>,
    snapshot: ArcSwap<RouteSnapshot>,
    write_lock: Mutex<()>,
}

impl RouteRegistry {
    /// Build a registry from whatever the store currently holds.
    ///
    /// Persisted entries whose target no longer parses are skipped.
    pub async fn load(store: Arc<dyn RouteStore>, client: Arc<dyn HttpClient>) -> Self {
        let persisted = store.load().await;

        let mut routes = RouteTable::with_capacity(persisted.len());
        let mut proxies = HashMap::with_capacity(persisted.len());
        for (path, target) in persisted {
            match Route::new(path.clone(), target.clone()).validate() {
                Ok(parsed) => {
                    proxies.insert(
                        path.clone(),
                        Arc::new(ProxyHandler::new(parsed, client.clone())),
                    );
                    routes.insert(path, target);
                }
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Skipping persisted route");
                }
            }
        }

        tracing::info!(count = routes.len(), "Route registry loaded");
        Self {
            store,
            client,
            snapshot: ArcSwap::from_pointee(RouteSnapshot::build(routes, proxies)),
            write_lock: Mutex::new(()),
        }
    }

    /// Register (or replace) a route and persist the full table.
    ///
    /// The in-memory table is updated before the write. When the write fails
    /// the new route stays active and the error is returned so the caller can
    /// retry.
    pub async fn create_route(&self, route: Route) -> GatewayResult<()> {
        let target: RouteTarget = route.validate()?;

        let _guard = self.write_lock.lock().await;
        let current = self.snapshot.load_full();

        let mut routes = current.routes.clone();
        let mut proxies = current.proxies.clone();
        routes.insert(route.path.clone(), route.target.clone());
        proxies.insert(
            route.path.clone(),
            Arc::new(ProxyHandler::new(target, self.client.clone())),
        );

        let next = RouteSnapshot::build(routes, proxies);
        self.snapshot.store(Arc::new(next));

        let table = self.snapshot.load().routes.clone();
        if let Err(e) = self.store.save(&table).await {
            tracing::error!(path = %route.path, error = %e, "Failed to persist route table");
            return Err(e.into());
        }

        tracing::info!(path = %route.path, upstream = %route.target, "Route registered");
        Ok(())
    }

    /// Snapshot of every registered route, in no particular order.
    pub fn get_routes(&self) -> Vec<Route> {
        self.snapshot
            .load()
            .routes
            .iter()
            .map(|(path, target)| Route::new(path.clone(), target.clone()))
            .collect()
    }

    /// The handler of the longest registered path that prefixes `request_path`.
    pub fn get_proxy(&self, request_path: &str) -> Option<Arc<ProxyHandler>> {
        let snapshot = self.snapshot.load();
        snapshot
            .order
            .iter()
            .find(|path| request_path.starts_with(path.as_str()))
            .and_then(|path| snapshot.proxies.get(path).cloned())
    }

    /// The registered path that would serve `request_path`.
    pub fn matched_path(&self, request_path: &str) -> Option<String> {
        self.snapshot
            .load()
            .order
            .iter()
            .find(|path| request_path.starts_with(path.as_str()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex as StdMutex, time::Duration};

    use async_trait::async_trait;
    use axum::body::Body;
    use hyper::{Request, Response};

    use super::*;
    use crate::{
        core::error::GatewayError,
        ports::{
            http_client::HttpClientResult,
            route_store::{StoreError, StoreResult},
        },
    };

    struct NoopClient;

    #[async_trait]
    impl HttpClient for NoopClient {
        async fn send_request(&self, _req: Request<Body>) -> HttpClientResult<Response<Body>> {
            Ok(Response::new(Body::empty()))
        }

        async fn probe(&self, _url: &str, _timeout: Duration) -> HttpClientResult<bool> {
            Ok(true)
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        initial: RouteTable,
        saved: StdMutex<Vec<RouteTable>>,
        fail_saves: bool,
    }

    #[async_trait]
    impl RouteStore for MemoryStore {
        async fn load(&self) -> RouteTable {
            self.initial.clone()
        }

        async fn save(&self, table: &RouteTable) -> StoreResult<()> {
            if self.fail_saves {
                return Err(StoreError::Io(std::io::Error::other("disk full")));
            }
            self.saved.lock().unwrap().push(table.clone());
            Ok(())
        }
    }

    async fn registry(store: Arc<MemoryStore>) -> RouteRegistry {
        RouteRegistry::load(store, Arc::new(NoopClient)).await
    }

    #[tokio::test]
    async fn test_longest_prefix_wins() {
        let registry = registry(Arc::new(MemoryStore::default())).await;
        for path in ["/test", "/", "/testtest", "/testtesttest"] {
            registry
                .create_route(Route::new(path, format!("http://localhost:8080{path}")))
                .await
                .unwrap();
        }

        for path in ["/test", "/", "/testtest", "/testtesttest"] {
            assert_eq!(registry.matched_path(path).as_deref(), Some(path));
            let proxy = registry.get_proxy(path).unwrap();
            assert_eq!(
                proxy.target().url().as_str(),
                format!("http://localhost:8080{path}")
            );
        }

        assert_eq!(registry.matched_path("/testt").as_deref(), Some("/test"));
        assert_eq!(registry.matched_path("/other").as_deref(), Some("/"));
    }

    #[tokio::test]
    async fn test_no_match() {
        let registry = registry(Arc::new(MemoryStore::default())).await;
        registry
            .create_route(Route::new("/api", "http://localhost:8080"))
            .await
            .unwrap();

        assert!(registry.get_proxy("/web").is_none());
    }

    #[tokio::test]
    async fn test_reregistration_replaces_target() {
        let store = Arc::new(MemoryStore::default());
        let registry = registry(store.clone()).await;

        registry
            .create_route(Route::new("/app", "http://localhost:1000"))
            .await
            .unwrap();
        registry
            .create_route(Route::new("/app", "http://localhost:2000"))
            .await
            .unwrap();

        let routes = registry.get_routes();
        assert_eq!(routes, vec![Route::new("/app", "http://localhost:2000")]);
        assert_eq!(
            registry.get_proxy("/app/x").unwrap().target().origin(),
            "http://localhost:2000"
        );
        assert_eq!(store.saved.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_target_is_not_persisted() {
        let store = Arc::new(MemoryStore::default());
        let registry = registry(store.clone()).await;

        let err = registry
            .create_route(Route::new("/bad", "not a url"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidTarget { .. }));
        assert!(registry.is_empty());
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_route_in_memory() {
        let store = Arc::new(MemoryStore {
            fail_saves: true,
            ..Default::default()
        });
        let registry = registry(store).await;

        let err = registry
            .create_route(Route::new("/app", "http://localhost:1000"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::PersistenceFailure(_)));
        assert!(registry.get_proxy("/app").is_some());
    }

    #[tokio::test]
    async fn test_load_skips_invalid_entries() {
        let mut initial = RouteTable::new();
        initial.insert("/good".to_string(), "http://localhost:1000".to_string());
        initial.insert("/bad".to_string(), "::::".to_string());
        let store = Arc::new(MemoryStore {
            initial,
            ..Default::default()
        });

        let registry = registry(store).await;
        assert_eq!(registry.len(), 1);
        assert!(registry.get_proxy("/good").is_some());
        assert!(registry.get_proxy("/bad").is_none());
    }

    #[tokio::test]
    async fn test_concurrent_registrations_all_land() {
        let store = Arc::new(MemoryStore::default());
        let registry = Arc::new(registry(store.clone()).await);

        let mut tasks = Vec::new();
        for i in 0..16 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry
                    .create_route(Route::new(
                        format!("/svc{i}"),
                        format!("http://localhost:{}", 9000 + i),
                    ))
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(registry.len(), 16);
        let saved = store.saved.lock().unwrap();
        assert_eq!(saved.last().unwrap().len(), 16);
    }
}
