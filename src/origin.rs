//! Client origin address resolution.
//!
//! Proxies put the real client address in a forwarding header; the first
//! usable header wins, otherwise the socket peer address is used.

use std::net::IpAddr;

/// Forwarding headers consulted, in order.
pub const FORWARDING_HEADERS: [&str; 5] = [
    "X-Forwarded-For",
    "Proxy-Client-IP",
    "WL-Proxy-Client-IP",
    "HTTP_CLIENT_IP",
    "HTTP_X_FORWARDED_FOR",
];

/// Rough network location of an origin address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginKind {
    Loopback,
    Private,
    Public,
    /// Not a parseable IP address.
    Unknown,
}

/// Resolves the client origin from request headers and the peer address.
///
/// `header` looks up a header value by name. Empty and `unknown` values are
/// skipped; for a comma-separated proxy chain the first entry is the client.
pub fn resolve_origin<'a>(
    header: impl Fn(&str) -> Option<&'a str>,
    peer: Option<IpAddr>,
) -> Option<String> {
    let forwarded = FORWARDING_HEADERS
        .iter()
        .filter_map(|name| header(*name))
        .map(|value| value.split(',').next().unwrap_or_default().trim())
        .find(|value| usable(value));

    let origin = match forwarded {
        Some(value) => value.to_string(),
        None => peer?.to_string(),
    };
    Some(normalize(origin))
}

/// Classifies an origin address for log context.
pub fn classify(origin: &str) -> OriginKind {
    match origin.parse::<IpAddr>() {
        Ok(ip) if ip.is_loopback() => OriginKind::Loopback,
        Ok(IpAddr::V4(v4)) if v4.is_private() || v4.is_link_local() => OriginKind::Private,
        Ok(IpAddr::V6(v6)) if v6.is_unique_local() || v6.is_unicast_link_local() => {
            OriginKind::Private
        }
        Ok(_) => OriginKind::Public,
        Err(_) => OriginKind::Unknown,
    }
}

fn usable(value: &str) -> bool {
    !value.is_empty() && !value.eq_ignore_ascii_case("unknown")
}

// IPv6 loopback is reported as its IPv4 form.
fn normalize(origin: String) -> String {
    match origin.as_str() {
        "::1" | "0:0:0:0:0:0:0:1" => "127.0.0.1".to_string(),
        _ => origin,
    }
}
