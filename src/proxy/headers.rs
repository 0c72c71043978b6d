//! Request header construction for proxied requests, and hop-by-hop
//! stripping in both directions.

use std::sync::LazyLock;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

static HOP_BY_HOP: LazyLock<Vec<HeaderName>> = LazyLock::new(|| {
    [
        "connection",
        "keep-alive",
        "transfer-encoding",
        "te",
        "trailer",
        "upgrade",
        "proxy-authorization",
        "proxy-authenticate",
    ]
    .iter()
    .filter_map(|name| name.parse::<HeaderName>().ok())
    .collect()
});

pub const CORRELATION_ID: &str = "x-correlation-id";

/// Strip hop-by-hop headers and `content-length` from an upstream response.
///
/// The body has already been collected, so the origin's framing headers no
/// longer apply; axum sets `content-length` from the actual bytes.
pub fn strip_response_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.remove(header::CONTENT_LENGTH);
}

/// Per-request inputs for [`build_forwarded_headers`].
#[derive(Debug, Clone, Copy)]
pub struct ForwardContext<'a> {
    pub client_ip: &'a str,
    pub correlation_id: &'a str,
    /// Keep the client's `Host` instead of the backend's authority.
    pub forward_host: bool,
}

pub fn build_forwarded_headers(
    original: &HeaderMap,
    backend: &url::Url,
    ctx: ForwardContext<'_>,
) -> HeaderMap {
    let mut headers = original.clone();

    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }

    if !ctx.forward_host {
        if let Some(host) = backend.host_str() {
            let host_value = backend
                .port()
                .map_or_else(|| host.to_string(), |port| format!("{host}:{port}"));
            if let Ok(val) = HeaderValue::from_str(&host_value) {
                headers.insert(header::HOST, val);
            }
        }
    }

    // X-Forwarded-For: append to chain
    let xff = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map_or_else(
            || ctx.client_ip.to_string(),
            |existing| format!("{existing}, {}", ctx.client_ip),
        );
    if let Ok(val) = HeaderValue::from_str(&xff) {
        headers.insert("x-forwarded-for", val);
    }

    let real_ip = xff.split(',').next().unwrap_or(ctx.client_ip).trim();
    if let Ok(val) = HeaderValue::from_str(real_ip) {
        headers.insert("x-real-ip", val);
    }

    // The public listener is plain HTTP; TLS is terminated elsewhere.
    if !headers.contains_key("x-forwarded-proto") {
        headers.insert("x-forwarded-proto", HeaderValue::from_static("http"));
    }

    if let Some(original_host) = original.get(header::HOST) {
        headers.insert("x-forwarded-host", original_host.clone());
    }

    headers.insert(header::VIA, HeaderValue::from_static("1.1 gatehouse"));

    if let Ok(val) = HeaderValue::from_str(ctx.correlation_id) {
        headers.insert(CORRELATION_ID, val);
    }

    headers
}
