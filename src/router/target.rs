//! Compiled targets: what a matched route or redirect does.
//!
//! Route targets either forward to a backend ([`ProxyTarget`]) or answer
//! locally ([`StaticTarget`]). Redirects are a separate type so the two
//! tables cannot be mixed up.

use bytes::Bytes;
use hyper::StatusCode;
use url::Url;

use super::path::Params;
use super::record::{RedirectRecord, RouteKind, RouteRecord};
use crate::error::GatehouseError;

/// Name of the catch-all parameter registered for prefix records.
pub const SUBPATH: &str = "subpath";

const DEFAULT_STATIC_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    Proxy(ProxyTarget),
    Static(StaticTarget),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    pub backend: Url,
    pub forward_host: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticTarget {
    pub body: Bytes,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    pub destination: String,
    pub code: StatusCode,
    pub preserve_path: bool,
}

impl ProxyTarget {
    /// Backend URL for a request, with the matched sub-path appended and
    /// the request query carried over.
    #[must_use]
    pub fn upstream_url(&self, params: &Params, query: Option<&str>) -> Url {
        let mut url = self.backend.clone();
        if let Some(sub) = params.get(SUBPATH).filter(|s| !s.is_empty()) {
            let base = url.path().trim_end_matches('/').to_string();
            url.set_path(&format!("{base}/{sub}"));
        }
        if query.is_some() {
            url.set_query(query);
        }
        url
    }
}

impl RedirectTarget {
    /// `Location` value for a request.
    #[must_use]
    pub fn location(&self, params: &Params, query: Option<&str>) -> String {
        let mut location = substitute_params(&self.destination, params);
        if self.preserve_path {
            if let Some(sub) = params.get(SUBPATH).filter(|s| !s.is_empty()) {
                let trimmed_len = location.trim_end_matches('/').len();
                location.truncate(trimmed_len);
                location.push('/');
                location.push_str(sub);
            }
            if let Some(q) = query.filter(|q| !q.is_empty()) {
                location.push(if location.contains('?') { '&' } else { '?' });
                location.push_str(q);
            }
        }
        location
    }
}

/// Substitute `:param` placeholders in a destination template.
/// Longer names are replaced first so `:userId` is not clobbered by `:user`.
fn substitute_params(template: &str, params: &Params) -> String {
    let mut result = template.to_string();
    let mut sorted: Vec<(&str, &str)> = params.iter().filter(|(k, _)| *k != SUBPATH).collect();
    sorted.sort_by_key(|(k, _)| std::cmp::Reverse(k.len()));

    for (key, value) in sorted {
        result = result.replace(&format!(":{key}"), value);
    }
    result
}

impl TryFrom<&RouteRecord> for RouteTarget {
    type Error = GatehouseError;

    fn try_from(record: &RouteRecord) -> Result<Self, Self::Error> {
        match record.kind {
            RouteKind::Proxy => {
                let backend = Url::parse(&record.destination).map_err(|e| {
                    GatehouseError::InvalidRecord {
                        table: "route",
                        host: record.host.clone(),
                        path: record.path.clone(),
                        message: format!("'{}' is not a valid URL: {e}", record.destination),
                    }
                })?;
                if backend.scheme() != "http" && backend.scheme() != "https" {
                    return Err(GatehouseError::InvalidRecord {
                        table: "route",
                        host: record.host.clone(),
                        path: record.path.clone(),
                        message: format!(
                            "unsupported scheme '{}' (expected http or https)",
                            backend.scheme()
                        ),
                    });
                }
                Ok(Self::Proxy(ProxyTarget {
                    backend,
                    forward_host: record.forward_host,
                }))
            }
            RouteKind::Static => Ok(Self::Static(StaticTarget {
                body: Bytes::from(record.destination.clone()),
                content_type: record
                    .content_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_STATIC_CONTENT_TYPE.to_string()),
            })),
        }
    }
}

impl TryFrom<&RedirectRecord> for RedirectTarget {
    type Error = GatehouseError;

    fn try_from(record: &RedirectRecord) -> Result<Self, Self::Error> {
        let code = match record.code {
            0 => StatusCode::FOUND,
            300..=308 => StatusCode::from_u16(record.code).map_err(|e| {
                GatehouseError::InvalidRecord {
                    table: "redirect",
                    host: record.host.clone(),
                    path: record.path.clone(),
                    message: e.to_string(),
                }
            })?,
            other => {
                return Err(GatehouseError::InvalidRecord {
                    table: "redirect",
                    host: record.host.clone(),
                    path: record.path.clone(),
                    message: format!("{other} is not a redirect status code"),
                })
            }
        };
        if record.destination.is_empty() {
            return Err(GatehouseError::InvalidRecord {
                table: "redirect",
                host: record.host.clone(),
                path: record.path.clone(),
                message: "destination cannot be empty".into(),
            });
        }
        Ok(Self {
            destination: record.destination.clone(),
            code,
            preserve_path: record.prefix,
        })
    }
}
