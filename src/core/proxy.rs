use std::{net::SocketAddr, sync::Arc};

use axum::{body::Body, response::IntoResponse};
use http::{HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode, Uri, header};

use crate::{core::route::RouteTarget, ports::http_client::HttpClient};

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Reverse proxy for a single registered route.
///
/// One handler exists per route path and is rebuilt whenever that path is
/// registered again, so a handler never outlives its target.
pub struct ProxyHandler {
    target: RouteTarget,
    client: Arc<dyn HttpClient>,
}

impl ProxyHandler {
    pub fn new(target: RouteTarget, client: Arc<dyn HttpClient>) -> Self {
        Self { target, client }
    }

    pub fn target(&self) -> &RouteTarget {
        &self.target
    }

    /// Forward `req` to the target and relay the answer.
    ///
    /// `peer` is the socket address the request arrived from. It is appended
    /// to `X-Forwarded-For` after whatever the trust boundary kept.
    pub async fn forward(&self, req: Request<Body>, peer: Option<SocketAddr>) -> Response<Body> {
        let (mut parts, body) = req.into_parts();

        let path_and_query = self
            .target
            .join_path_and_query(parts.uri.path(), parts.uri.query());
        let uri = match format!("{}{}", self.target.origin(), path_and_query).parse::<Uri>() {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(
                    upstream = %self.target,
                    error = %e,
                    "Failed to build upstream URI"
                );
                return StatusCode::BAD_GATEWAY.into_response();
            }
        };

        let original_host = parts.headers.get(header::HOST).cloned();
        strip_hop_by_hop(&mut parts.headers);
        parts.headers.remove(header::HOST);

        if let Some(peer) = peer {
            append_forwarded_for(&mut parts.headers, &peer.ip().to_string());
        }
        if let Some(host) = original_host {
            parts.headers.insert(X_FORWARDED_HOST, host);
        }
        parts
            .headers
            .insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));

        parts.uri = uri;
        let outgoing = Request::from_parts(parts, body);

        match self.client.send_request(outgoing).await {
            Ok(response) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                Response::from_parts(parts, body)
            }
            Err(e) => {
                tracing::warn!(upstream = %self.target, error = %e, "Upstream request failed");
                (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response()
            }
        }
    }
}

/// Remove hop-by-hop headers, including any named by `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    for name in listed {
        headers.remove(name.as_str());
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, ip: &str) {
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.trim().is_empty() => format!("{existing}, {ip}"),
        _ => ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use async_trait::async_trait;

    use super::*;
    use crate::ports::http_client::{HttpClientError, HttpClientResult};

    #[derive(Default)]
    struct RecordingClient {
        seen: Mutex<Option<(Uri, HeaderMap)>>,
        fail: bool,
    }

    #[async_trait]
    impl HttpClient for RecordingClient {
        async fn send_request(
            &self,
            req: Request<Body>,
        ) -> HttpClientResult<Response<Body>> {
            *self.seen.lock().unwrap() = Some((req.uri().clone(), req.headers().clone()));
            if self.fail {
                return Err(HttpClientError::ConnectionError("refused".to_string()));
            }
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("keep-alive", "timeout=5")
                .header("x-upstream", "yes")
                .body(Body::from("ok"))
                .unwrap())
        }

        async fn probe(&self, _url: &str, _timeout: Duration) -> HttpClientResult<bool> {
            Ok(true)
        }
    }

    fn handler(target: &str, client: Arc<RecordingClient>) -> ProxyHandler {
        ProxyHandler::new(RouteTarget::new(target).unwrap(), client)
    }

    #[tokio::test]
    async fn test_forward_rewrites_uri_and_headers() {
        let client = Arc::new(RecordingClient::default());
        let proxy = handler("http://127.0.0.1:9000/base", client.clone());

        let req = Request::builder()
            .uri("/v1/apps?page=2")
            .header(header::HOST, "gateway.local")
            .header(header::CONNECTION, "keep-alive, x-secret")
            .header("x-secret", "drop me")
            .header(X_FORWARDED_FOR, "203.0.113.5")
            .body(Body::empty())
            .unwrap();
        let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();

        let response = proxy.forward(req, Some(peer)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("keep-alive").is_none());
        assert_eq!(response.headers().get("x-upstream").unwrap(), "yes");

        let (uri, headers) = client.seen.lock().unwrap().clone().unwrap();
        assert_eq!(uri.to_string(), "http://127.0.0.1:9000/base/v1/apps?page=2");
        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get("x-secret").is_none());
        assert_eq!(
            headers.get(&X_FORWARDED_FOR).unwrap(),
            "203.0.113.5, 127.0.0.1"
        );
        assert_eq!(headers.get(&X_FORWARDED_HOST).unwrap(), "gateway.local");
        assert_eq!(headers.get(&X_FORWARDED_PROTO).unwrap(), "http");
    }

    #[tokio::test]
    async fn test_forward_sets_peer_when_no_forwarded_header() {
        let client = Arc::new(RecordingClient::default());
        let proxy = handler("http://127.0.0.1:9000", client.clone());

        let req = Request::builder().uri("/x").body(Body::empty()).unwrap();
        let peer: SocketAddr = "198.51.100.7:5555".parse().unwrap();
        proxy.forward(req, Some(peer)).await;

        let (_, headers) = client.seen.lock().unwrap().clone().unwrap();
        assert_eq!(headers.get(&X_FORWARDED_FOR).unwrap(), "198.51.100.7");
    }

    #[tokio::test]
    async fn test_upstream_failure_is_bad_gateway() {
        let client = Arc::new(RecordingClient {
            fail: true,
            ..Default::default()
        });
        let proxy = handler("http://127.0.0.1:9000", client);

        let req = Request::builder().uri("/x").body(Body::empty()).unwrap();
        let response = proxy.forward(req, None).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
