//! The public gateway handler.
//!
//! [`gateway_handler`] is the axum fallback on the public listener. Per
//! request it answers ACME challenges first, then favicons, then runs the
//! routing table: redirects get a `Location` response, proxy targets are
//! forwarded ([`forward`]) with rewritten headers ([`headers`]), static
//! targets answer `GET`/`HEAD` directly. Misses and upstream failures are
//! rendered through the error-page provider.

pub mod forward;
pub mod headers;

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};

use crate::acme::CHALLENGE_PREFIX;
use crate::domain::drop_port;
use crate::providers::IconFormat;
use crate::router::{Dispatch, Params, ProxyTarget, RedirectTarget, RouteTarget, StaticTarget};
use crate::server::AppState;

use self::forward::ForwardRequest;
use self::headers::{ForwardContext, CORRELATION_ID};

/// The host the client asked for: the `Host` header, else the URI authority.
fn request_host<'a>(headers: &'a HeaderMap, uri: &'a Uri) -> &'a str {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or("")
}

pub async fn gateway_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    req_headers: HeaderMap,
    body: Bytes,
) -> Response {
    let host = request_host(&req_headers, &uri);
    let path = uri.path();

    if let Some(key) = path.strip_prefix(CHALLENGE_PREFIX) {
        return acme_response(&state, host, key).await;
    }

    if let Some(format) = IconFormat::from_path(path) {
        if let Some(response) = favicon_response(&state, host, format, &req_headers).await {
            return response;
        }
    }

    let correlation_id = req_headers
        .get(CORRELATION_ID)
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from);

    let table = state.router.table().await;
    match table.router.dispatch(host, path) {
        Dispatch::Redirect { target, params } => {
            state.stats.redirected.fetch_add(1, Ordering::Relaxed);
            redirect_response(target, &params, uri.query())
        }
        Dispatch::Route {
            target: RouteTarget::Static(target),
            ..
        } => static_response(target, &method),
        Dispatch::Route {
            target: RouteTarget::Proxy(target),
            params,
        } => {
            let request = ProxiedRequest {
                client_ip: addr.ip().to_string(),
                correlation_id,
                method,
                uri: &uri,
                headers: &req_headers,
                body,
            };
            proxy_response(&state, target, &params, request).await
        }
        Dispatch::NotFound => {
            state.stats.not_found.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(host = %host, path = %path, "no route matched");
            state
                .error_pages
                .page(StatusCode::NOT_FOUND)
                .await
                .into_response()
        }
    }
}

async fn acme_response(state: &AppState, host: &str, key: &str) -> Response {
    let value = match drop_port(host) {
        Some(domain) => state.acme.get(domain, key).await,
        None => None,
    };
    match value {
        Some(value) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            value,
        )
            .into_response(),
        None => state
            .error_pages
            .page(StatusCode::NOT_FOUND)
            .await
            .into_response(),
    }
}

/// `None` when the host has no icon of this format, so the request
/// continues to the routing table.
async fn favicon_response(
    state: &AppState,
    host: &str,
    format: IconFormat,
    req_headers: &HeaderMap,
) -> Option<Response> {
    let icons = state.favicons.get_icons(drop_port(host)?).await?;
    let image = icons.get(format)?;
    let etag = format!("\"{}\"", image.hash);

    let not_modified = req_headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|tag| tag.trim() == etag));
    if not_modified {
        return Some((StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response());
    }

    Some(
        (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, format.content_type().to_string()),
                (header::ETAG, etag),
            ],
            image.raw.clone(),
        )
            .into_response(),
    )
}

fn redirect_response(target: &RedirectTarget, params: &Params, query: Option<&str>) -> Response {
    let location = target.location(params, query);
    match HeaderValue::from_str(&location) {
        Ok(value) => (target.code, [(header::LOCATION, value)]).into_response(),
        Err(e) => {
            tracing::error!(location = %location, error = %e, "redirect location is not a valid header");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn static_response(target: &StaticTarget, method: &Method) -> Response {
    let body = match *method {
        Method::GET => Body::from(target.body.clone()),
        Method::HEAD => Body::empty(),
        _ => {
            return (
                StatusCode::METHOD_NOT_ALLOWED,
                [(header::ALLOW, "GET, HEAD")],
            )
                .into_response()
        }
    };
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, target.content_type.as_str())
        .header(header::CONTENT_LENGTH, target.body.len())
        .body(body)
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to build static response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

struct ProxiedRequest<'a> {
    client_ip: String,
    correlation_id: String,
    method: Method,
    uri: &'a Uri,
    headers: &'a HeaderMap,
    body: Bytes,
}

async fn proxy_response(
    state: &AppState,
    target: &ProxyTarget,
    params: &Params,
    req: ProxiedRequest<'_>,
) -> Response {
    let upstream_url = target.upstream_url(params, req.uri.query());
    let forwarded_headers = headers::build_forwarded_headers(
        req.headers,
        &upstream_url,
        ForwardContext {
            client_ip: &req.client_ip,
            correlation_id: &req.correlation_id,
            forward_host: target.forward_host,
        },
    );

    tracing::info!(
        correlation_id = %req.correlation_id,
        method = %req.method,
        upstream = %upstream_url,
        "forwarding request"
    );

    let result = forward::forward(ForwardRequest {
        client: &state.http_client,
        method: req.method,
        url: &upstream_url,
        headers: forwarded_headers,
        body: req.body,
        timeout: state.proxy_timeout,
    })
    .await;

    match result {
        Ok(mut upstream) => {
            state.stats.forwarded.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                correlation_id = %req.correlation_id,
                status = upstream.status.as_u16(),
                latency_ms = upstream.latency_ms,
                "upstream responded"
            );
            headers::strip_response_hop_by_hop(&mut upstream.headers);
            let mut builder = Response::builder().status(upstream.status);
            for (key, value) in &upstream.headers {
                builder = builder.header(key, value);
            }
            builder
                .header(CORRELATION_ID, &req.correlation_id)
                .body(Body::from(upstream.body))
                .unwrap_or_else(|e| {
                    tracing::error!(
                        correlation_id = %req.correlation_id,
                        error = %e,
                        "failed to build response"
                    );
                    StatusCode::BAD_GATEWAY.into_response()
                })
        }
        Err(e) => {
            state.stats.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                correlation_id = %req.correlation_id,
                upstream = %upstream_url,
                error = %e,
                "upstream request failed"
            );
            state
                .error_pages
                .page(StatusCode::BAD_GATEWAY)
                .await
                .into_response()
        }
    }
}
