use std::{
    net::{IpAddr, SocketAddr, TcpListener},
    ops::Range,
};

/// Ports tried, in order, when no gateway port is configured.
pub const CANDIDATE_RANGES: [Range<u16>; 2] = [80..90, 8080..8090];

pub fn candidate_ports() -> impl Iterator<Item = u16> {
    CANDIDATE_RANGES.into_iter().flatten()
}

/// First candidate that can be bound (and released again) on `host`.
pub fn find_available_port(host: IpAddr) -> Option<u16> {
    find_available_port_in(host, candidate_ports())
}

pub fn find_available_port_in(
    host: IpAddr,
    candidates: impl IntoIterator<Item = u16>,
) -> Option<u16> {
    candidates.into_iter().find(|&port| {
        tracing::debug!(port, "Checking whether port is available");
        match TcpListener::bind(SocketAddr::new(host, port)) {
            Ok(listener) => {
                drop(listener);
                true
            }
            Err(e) => {
                tracing::debug!(port, error = %e, "Port unavailable");
                false
            }
        }
    })
}
