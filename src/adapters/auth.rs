//! Authorization decision point for guarded management routes.
//!
//! Local callers pass through. Everyone else must present a token that the
//! configured [`TokenVerifier`] accepts.
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use async_trait::async_trait;
use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    adapters::management::ApiResult,
    core::{
        proxy::{X_FORWARDED_FOR, X_REAL_IP},
        trust::{parse_forwarded_for, socket_peer},
    },
    ports::token_verifier::TokenVerifier,
};

#[derive(Clone)]
pub struct AuthGate {
    verifier: Arc<dyn TokenVerifier>,
}

impl AuthGate {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { verifier }
    }

    /// Gate backed by a shared secret, or one that rejects every remote
    /// caller when no secret is configured.
    pub fn from_token(token: Option<String>) -> Self {
        match token.filter(|t| !t.is_empty()) {
            Some(token) => Self::new(Arc::new(StaticTokenVerifier::new(token))),
            None => Self::new(Arc::new(DenyAllVerifier)),
        }
    }

    /// Whether a request with `headers` from `peer` may proceed.
    pub async fn authorize(
        &self,
        headers: &HeaderMap,
        query: Option<&str>,
        peer: Option<SocketAddr>,
    ) -> bool {
        if client_identity(headers, peer).is_some_and(|ip| ip.is_loopback()) {
            return true;
        }
        match extract_token(headers, query) {
            Some(token) => self.verifier.verify(&token).await,
            None => false,
        }
    }
}

/// First forwarded-for entry, else `X-Real-IP`, else the socket peer.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    if let Some(first) = parse_forwarded_for(headers).first() {
        return first.parse().ok();
    }
    if let Some(real_ip) = headers
        .get(&X_REAL_IP)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return real_ip.parse().ok();
    }
    peer.map(|addr| addr.ip())
}

/// Token from `Authorization` (with or without `Bearer `) or `?token=`.
pub fn extract_token(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }

    query.and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(key, value)| key == "token" && !value.is_empty())
            .map(|(_, value)| value.into_owned())
    })
}

pub async fn require_auth(State(gate): State<AuthGate>, req: Request, next: Next) -> Response {
    let peer = socket_peer(req.extensions());

    if gate.authorize(req.headers(), req.uri().query(), peer).await {
        return next.run(req).await;
    }

    tracing::warn!(
        peer = ?peer,
        forwarded_for = ?req.headers().get(&X_FORWARDED_FOR),
        path = %req.uri().path(),
        "Rejected unauthenticated request"
    );
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiResult::<()>::error("unauthorized")),
    )
        .into_response()
}

/// Accepts exactly one preconfigured token.
pub struct StaticTokenVerifier {
    token: String,
}

impl StaticTokenVerifier {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> bool {
        let expected = self.token.as_bytes();
        let presented = token.as_bytes();
        expected.len() == presented.len()
            && expected
                .iter()
                .zip(presented)
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}

pub struct DenyAllVerifier;

#[async_trait]
impl TokenVerifier for DenyAllVerifier {
    async fn verify(&self, _token: &str) -> bool {
        false
    }
}
