use std::sync::Arc;

use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::{
    adapters::middleware::with_observability,
    core::{
        registry::RouteRegistry,
        trust::{socket_peer, trust_boundary},
    },
};

/// Router served by the public gateway listener.
///
/// `GET /ping` answers locally; every other request goes through the trust
/// boundary and is dispatched to the longest matching registered route.
pub fn gateway_router(registry: Arc<RouteRegistry>) -> Router {
    let router = Router::new()
        .route("/ping", get(ping))
        .fallback(dispatch)
        .layer(middleware::from_fn(trust_boundary))
        .with_state(registry);

    with_observability(router)
}

async fn ping() -> &'static str {
    "pong from gateway service"
}

async fn dispatch(State(registry): State<Arc<RouteRegistry>>, req: Request) -> Response {
    let path = req.uri().path().to_string();

    let Some(proxy) = registry.get_proxy(&path) else {
        tracing::debug!(path = %path, "No route matched");
        return StatusCode::NOT_FOUND.into_response();
    };

    let peer = socket_peer(req.extensions());
    proxy.forward(req, peer).await
}

#[cfg(test)]
mod tests {
    use std::{
        net::SocketAddr,
        sync::Mutex,
        time::Duration,
    };

    use async_trait::async_trait;
    use axum::{
        body::Body,
        extract::connect_info::MockConnectInfo,
        http::{HeaderMap, Request as HttpRequest, Uri},
    };
    use hyper::Response as HyperResponse;
    use tower::ServiceExt; // for oneshot

    use super::*;
    use crate::{
        core::{proxy::X_FORWARDED_FOR, route::Route},
        ports::{
            http_client::{HttpClient, HttpClientResult},
            route_store::{RouteStore, RouteTable, StoreResult},
        },
    };

    #[derive(Default)]
    struct RecordingClient {
        seen: Mutex<Vec<(Uri, HeaderMap)>>,
    }

    #[async_trait]
    impl HttpClient for RecordingClient {
        async fn send_request(
            &self,
            req: HttpRequest<Body>,
        ) -> HttpClientResult<HyperResponse<Body>> {
            self.seen
                .lock()
                .unwrap()
                .push((req.uri().clone(), req.headers().clone()));
            Ok(HyperResponse::new(Body::from("upstream")))
        }

        async fn probe(&self, _url: &str, _timeout: Duration) -> HttpClientResult<bool> {
            Ok(true)
        }
    }

    struct NullStore;

    #[async_trait]
    impl RouteStore for NullStore {
        async fn load(&self) -> RouteTable {
            RouteTable::new()
        }

        async fn save(&self, _table: &RouteTable) -> StoreResult<()> {
            Ok(())
        }
    }

    async fn setup() -> (Arc<RouteRegistry>, Arc<RecordingClient>) {
        let client = Arc::new(RecordingClient::default());
        let registry = Arc::new(RouteRegistry::load(Arc::new(NullStore), client.clone()).await);
        registry
            .create_route(Route::new("/api", "http://127.0.0.1:7001"))
            .await
            .unwrap();
        registry
            .create_route(Route::new("/api/v2", "http://127.0.0.1:7002"))
            .await
            .unwrap();
        (registry, client)
    }

    fn request(uri: &str, xff: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().uri(uri);
        if let Some(xff) = xff {
            builder = builder.header(X_FORWARDED_FOR, xff);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn app(registry: Arc<RouteRegistry>, peer: &str) -> Router {
        let peer: SocketAddr = peer.parse().unwrap();
        gateway_router(registry).layer(MockConnectInfo(peer))
    }

    #[tokio::test]
    async fn test_ping_is_local() {
        let (registry, client) = setup().await;
        let response = app(registry, "198.51.100.7:1000")
            .oneshot(request("/ping", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(client.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unmatched_is_not_found() {
        let (registry, _) = setup().await;
        let response = app(registry, "198.51.100.7:1000")
            .oneshot(request("/web", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dispatch_uses_longest_prefix() {
        let (registry, client) = setup().await;
        let response = app(registry.clone(), "198.51.100.7:1000")
            .oneshot(request("/api/v2/items", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        app(registry, "198.51.100.7:1000")
            .oneshot(request("/api/v1/items", None))
            .await
            .unwrap();

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen[0].0.to_string(), "http://127.0.0.1:7002/api/v2/items");
        assert_eq!(seen[1].0.to_string(), "http://127.0.0.1:7001/api/v1/items");
    }

    #[tokio::test]
    async fn test_direct_client_cannot_spoof_forwarded_for() {
        let (registry, client) = setup().await;
        app(registry, "198.51.100.7:1000")
            .oneshot(request("/api", Some("127.0.0.1")))
            .await
            .unwrap();

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen[0].1.get(&X_FORWARDED_FOR).unwrap(), "198.51.100.7");
    }

    #[tokio::test]
    async fn test_local_proxy_hop_is_kept() {
        let (registry, client) = setup().await;
        app(registry, "127.0.0.1:1000")
            .oneshot(request("/api", Some("10.0.0.9, 203.0.113.5")))
            .await
            .unwrap();

        let seen = client.seen.lock().unwrap();
        assert_eq!(
            seen[0].1.get(&X_FORWARDED_FOR).unwrap(),
            "203.0.113.5, 127.0.0.1"
        );
    }
}
