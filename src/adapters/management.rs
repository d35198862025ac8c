//! Management HTTP API used by sibling processes and operators.
//!
//! | Method | Path                 | Guarded |
//! |--------|----------------------|---------|
//! | GET    | `/ping`              | no      |
//! | GET    | `/v1/gateway/routes` | no      |
//! | POST   | `/v1/gateway/routes` | yes     |
//! | GET    | `/v1/gateway/port`   | yes     |
//! | PUT    | `/v1/gateway/port`   | yes     |
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::{
    adapters::{
        auth::{AuthGate, require_auth},
        middleware::{cors_middleware, with_observability},
    },
    config::validation::validate_port,
    core::{
        error::GatewayError,
        registry::RouteRegistry,
        route::{ChangePortRequest, Route},
        state::GatewayState,
    },
};

pub const ROUTES_PATH: &str = "/v1/gateway/routes";
pub const PORT_PATH: &str = "/v1/gateway/port";

/// JSON envelope returned by every non-list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResult<T> {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResult<T> {
    pub fn ok(data: Option<T>) -> Self {
        Self {
            success: true,
            message: "ok".to_string(),
            data,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResult::<()>::error(message))).into_response()
}

#[derive(Clone)]
pub struct ManagementContext {
    pub registry: Arc<RouteRegistry>,
    pub state: Arc<GatewayState>,
}

pub fn management_router(ctx: ManagementContext, auth: AuthGate) -> Router {
    let guard = middleware::from_fn_with_state(auth, require_auth);

    let router = Router::new()
        .route("/ping", get(ping))
        .route(
            ROUTES_PATH,
            get(list_routes).merge(post(create_route).route_layer(guard.clone())),
        )
        .route(
            PORT_PATH,
            get(get_port).put(change_port).route_layer(guard),
        )
        .layer(middleware::from_fn(cors_middleware))
        .with_state(ctx);

    with_observability(router)
}

async fn ping() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "pong from management service" }))
}

async fn list_routes(State(ctx): State<ManagementContext>) -> Json<Vec<Route>> {
    Json(ctx.registry.get_routes())
}

async fn create_route(
    State(ctx): State<ManagementContext>,
    payload: Result<Json<Route>, JsonRejection>,
) -> Response {
    let Json(route) = match payload {
        Ok(route) => route,
        Err(rejection) => return failure(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    match ctx.registry.create_route(route).await {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(e @ GatewayError::InvalidRoute(_)) => failure(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn get_port(State(ctx): State<ManagementContext>) -> Json<ApiResult<String>> {
    Json(ApiResult::ok(Some(ctx.state.gateway_port())))
}

async fn change_port(
    State(ctx): State<ManagementContext>,
    payload: Result<Json<ChangePortRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => return failure(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    let port = match validate_port(&request.port) {
        Ok(Some(port)) => port,
        Ok(None) => return failure(StatusCode::BAD_REQUEST, "port must not be empty"),
        Err(e) => return failure(StatusCode::BAD_REQUEST, e.to_string()),
    };

    match ctx.state.set_gateway_port(port.to_string()).await {
        Ok(()) => (StatusCode::OK, Json(ApiResult::<()>::ok(None))).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Gateway port change failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{net::SocketAddr, path::PathBuf, time::Duration};

    use async_trait::async_trait;
    use axum::{
        body::Body,
        extract::connect_info::MockConnectInfo,
        http::{Request, header},
    };
    use http_body_util::BodyExt;
    use hyper::Response as HyperResponse;
    use tempfile::TempDir;
    use tower::ServiceExt; // for oneshot

    use super::*;
    use crate::{
        adapters::json_route_store::JsonRouteStore,
        core::state::GatewaySettings,
        ports::http_client::{HttpClient, HttpClientResult},
    };

    struct NoopClient;

    #[async_trait]
    impl HttpClient for NoopClient {
        async fn send_request(&self, _req: Request<Body>) -> HttpClientResult<HyperResponse<Body>> {
            Ok(HyperResponse::new(Body::empty()))
        }

        async fn probe(&self, _url: &str, _timeout: Duration) -> HttpClientResult<bool> {
            Ok(true)
        }
    }

    async fn context(dir: &TempDir) -> ManagementContext {
        let store = Arc::new(JsonRouteStore::in_runtime_dir(dir.path()));
        let registry = Arc::new(RouteRegistry::load(store, Arc::new(NoopClient)).await);
        let state = Arc::new(GatewayState::new(GatewaySettings {
            gateway_port: "8080".to_string(),
            runtime_path: dir.path().to_path_buf(),
            www_path: PathBuf::from("/tmp/www"),
        }));
        ManagementContext { registry, state }
    }

    fn app(ctx: ManagementContext, peer: &str) -> Router {
        let peer: SocketAddr = peer.parse().unwrap();
        management_router(ctx, AuthGate::from_token(Some("s3cret".to_string())))
            .layer(MockConnectInfo(peer))
    }

    fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let dir = TempDir::new().unwrap();
        let response = app(context(&dir).await, "127.0.0.1:1000")
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_create_and_list_routes() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;

        let response = app(ctx.clone(), "127.0.0.1:1000")
            .oneshot(json_request(
                "POST",
                ROUTES_PATH,
                r#"{"path":"/test","target":"http://localhost:8080"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app(ctx, "127.0.0.1:1000")
            .oneshot(Request::builder().uri(ROUTES_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            serde_json::json!([{"path": "/test", "target": "http://localhost:8080"}])
        );
    }

    #[tokio::test]
    async fn test_create_route_malformed_body() {
        let dir = TempDir::new().unwrap();
        let response = app(context(&dir).await, "127.0.0.1:1000")
            .oneshot(json_request("POST", ROUTES_PATH, r#"{"path":"/x"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_create_route_invalid_target() {
        let dir = TempDir::new().unwrap();
        let response = app(context(&dir).await, "127.0.0.1:1000")
            .oneshot(json_request(
                "POST",
                ROUTES_PATH,
                r#"{"path":"/x","target":"not a url"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!dir.path().join("routes.json").exists());
    }

    #[tokio::test]
    async fn test_remote_create_requires_token() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;
        let body = r#"{"path":"/x","target":"http://localhost:9000"}"#;

        let response = app(ctx.clone(), "198.51.100.7:1000")
            .oneshot(json_request("POST", ROUTES_PATH, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut request = json_request("POST", ROUTES_PATH, body);
        request
            .headers_mut()
            .insert(header::AUTHORIZATION, "Bearer s3cret".parse().unwrap());
        let response = app(ctx, "198.51.100.7:1000")
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_remote_list_is_open() {
        let dir = TempDir::new().unwrap();
        let response = app(context(&dir).await, "198.51.100.7:1000")
            .oneshot(Request::builder().uri(ROUTES_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_port() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;

        let response = app(ctx.clone(), "127.0.0.1:1000")
            .oneshot(Request::builder().uri(PORT_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], "8080");

        let response = app(ctx, "198.51.100.7:1000")
            .oneshot(Request::builder().uri(PORT_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_change_port_runs_observers() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;
        ctx.state
            .on_gateway_port_change(|port| async move {
                if port == "9999" {
                    eyre::bail!("port 9999 is busy");
                }
                Ok(())
            })
            .await;

        let response = app(ctx.clone(), "127.0.0.1:1000")
            .oneshot(json_request("PUT", PORT_PATH, r#"{"port":"8081"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(ctx.state.gateway_port(), "8081");

        let response = app(ctx.clone(), "127.0.0.1:1000")
            .oneshot(json_request("PUT", PORT_PATH, r#"{"port":"9999"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("busy"));
        assert_eq!(ctx.state.gateway_port(), "8081");
    }

    #[tokio::test]
    async fn test_change_port_stores_normalized_port() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;

        for (requested, stored) in [(" 8081 ", "8081"), ("+8082", "8082"), ("08083", "8083")] {
            let body = serde_json::json!({ "port": requested }).to_string();
            let response = app(ctx.clone(), "127.0.0.1:1000")
                .oneshot(json_request("PUT", PORT_PATH, &body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "port {requested:?}");
            assert_eq!(ctx.state.gateway_port(), stored);
        }

        let response = app(ctx, "127.0.0.1:1000")
            .oneshot(Request::builder().uri(PORT_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(response).await["data"], "8083");
    }

    #[tokio::test]
    async fn test_change_port_malformed() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;

        for body in [
            r#"{"nope":1}"#,
            r#"{"port":"abc"}"#,
            r#"{"port":""}"#,
            r#"{"port":"  "}"#,
        ] {
            let response = app(ctx.clone(), "127.0.0.1:1000")
                .oneshot(json_request("PUT", PORT_PATH, body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body}");
        }
        assert_eq!(ctx.state.gateway_port(), "8080");
    }
}
