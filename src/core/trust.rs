//! Client address trust boundary for the public listener.
//!
//! A forwarded-for chain is only believed when the connection comes from
//! loopback, i.e. from a co-located proxy. Even then only the last hop that
//! proxy recorded is kept; anything before it could have been supplied by
//! the client. Direct connections lose the header entirely, leaving the
//! socket peer as the only identity downstream code can use.
use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request, connect_info::MockConnectInfo},
    http::{Extensions, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::core::proxy::{X_FORWARDED_FOR, X_REAL_IP};

/// Ordered entries of every `X-Forwarded-For` value, blanks dropped.
pub fn parse_forwarded_for(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// Rewrite the client address headers for a connection from `peer`.
///
/// `peer` is `None` when the socket address is unknown, which is treated
/// like a direct external connection.
pub fn rewrite_forwarded_for(headers: &mut HeaderMap, peer: Option<IpAddr>) {
    let chain = parse_forwarded_for(headers);

    headers.remove(&X_FORWARDED_FOR);
    headers.remove(&X_REAL_IP);

    let from_loopback = peer.is_some_and(|ip| ip.is_loopback());
    if !from_loopback {
        return;
    }

    if let Some(last) = chain.last() {
        match HeaderValue::from_str(last) {
            Ok(value) => {
                headers.insert(X_FORWARDED_FOR, value);
            }
            Err(e) => {
                tracing::debug!(entry = %last, error = %e, "Dropping unusable forwarded-for entry");
            }
        }
    }
}

/// Socket address of the connection a request arrived on.
pub fn socket_peer(extensions: &Extensions) -> Option<SocketAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .or_else(|| {
            extensions
                .get::<MockConnectInfo<SocketAddr>>()
                .map(|MockConnectInfo(addr)| *addr)
        })
}

/// Middleware applying [`rewrite_forwarded_for`] with the connection's peer.
pub async fn trust_boundary(mut req: Request, next: Next) -> Response {
    let peer = socket_peer(req.extensions()).map(|addr| addr.ip());

    rewrite_forwarded_for(req.headers_mut(), peer);
    next.run(req).await
}
