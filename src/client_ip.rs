//! Originating client address resolution.

use axum::http::HeaderMap;
use std::net::SocketAddr;

pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Used when neither a forwarded header nor the peer address is available.
pub const UNKNOWN_IP: &str = "unknown";

/// First entry of `X-Forwarded-For` if present, otherwise the peer address.
///
/// The header is trusted as-is: a client talking to us directly can put any
/// value in it.
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => UNKNOWN_IP.to_string(),
    }
}
