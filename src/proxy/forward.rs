//! A single upstream round trip over the shared client.

use std::time::{Duration, Instant};

use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::StatusCode;

use crate::error::GatehouseError;
use crate::server::HttpClient;

#[derive(Debug)]
pub struct Upstream {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub latency_ms: u64,
}

pub struct ForwardRequest<'a> {
    pub client: &'a HttpClient,
    pub method: Method,
    pub url: &'a url::Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub timeout: Duration,
}

#[allow(clippy::cast_possible_truncation)]
pub async fn forward(req: ForwardRequest<'_>) -> Result<Upstream, GatehouseError> {
    let start = Instant::now();

    let mut builder = hyper::Request::builder()
        .method(req.method)
        .uri(req.url.as_str());
    for (key, value) in &req.headers {
        builder = builder.header(key, value);
    }
    let request = builder
        .body(Full::new(req.body))
        .map_err(|e| GatehouseError::HttpRequest {
            source: Box::new(e),
        })?;

    let response = tokio::time::timeout(req.timeout, req.client.request(request))
        .await
        .map_err(|_| GatehouseError::HttpRequest {
            source: format!("timed out after {}ms", req.timeout.as_millis()).into(),
        })?
        .map_err(|e| GatehouseError::HttpRequest {
            source: Box::new(e),
        })?;

    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| GatehouseError::HttpRequest {
            source: format!("body read error: {e}").into(),
        })?
        .to_bytes();

    Ok(Upstream {
        status,
        headers,
        body,
        latency_ms: start.elapsed().as_millis() as u64,
    })
}
