//! Persisted route and redirect records.
//!
//! These are the rows the storage layer returns and the JSON bodies the
//! administrative API accepts. A record is compiled into a
//! [`RouteTarget`](super::target::RouteTarget) or
//! [`RedirectTarget`](super::target::RedirectTarget) during rebuild.

use serde::{Deserialize, Serialize};

use super::path::validate_pattern;
use super::target::{RedirectTarget, RouteTarget};
use crate::error::GatehouseError;

fn is_false(v: &bool) -> bool {
    !*v
}

fn is_proxy(v: &RouteKind) -> bool {
    *v == RouteKind::Proxy
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteKind {
    #[default]
    Proxy,
    Static,
}

impl RouteKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Proxy => "proxy",
            Self::Static => "static",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "proxy" => Some(Self::Proxy),
            "static" => Some(Self::Static),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteRecord {
    pub host: String,
    pub path: String,

    /// Also serve every sub-path of `path`.
    #[serde(default, skip_serializing_if = "is_false")]
    pub prefix: bool,

    #[serde(default, skip_serializing_if = "is_proxy")]
    pub kind: RouteKind,

    /// Backend URL for proxy routes, response body for static routes.
    pub destination: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Send the client's Host header upstream instead of the backend's.
    #[serde(default, skip_serializing_if = "is_false")]
    pub forward_host: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedirectRecord {
    pub host: String,
    pub path: String,

    /// Also redirect every sub-path, appending it to the destination.
    #[serde(default, skip_serializing_if = "is_false")]
    pub prefix: bool,

    pub destination: String,

    /// HTTP status code; 0 means 302.
    #[serde(default)]
    pub code: u16,
}

/// Identifies a record for deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordKey {
    pub host: String,
    pub path: String,
}

/// Prefix `/` when missing, as registration does.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn check_common(
    table: &'static str,
    host: &str,
    path: &str,
    prefix: bool,
) -> Result<(), GatehouseError> {
    let invalid = |message: String| GatehouseError::InvalidRecord {
        table,
        host: host.to_string(),
        path: path.to_string(),
        message,
    };
    if host.is_empty() {
        return Err(invalid("host cannot be empty".into()));
    }
    validate_pattern(&normalize_path(path)).map_err(|e| invalid(e.to_string()))?;
    // A prefix record appends `/*subpath`, which cannot follow another catch-all.
    let last = path.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    if prefix && last.starts_with('*') {
        return Err(invalid("prefix cannot extend a catch-all path".into()));
    }
    Ok(())
}

impl RouteRecord {
    /// Reject records that would fail a rebuild.
    pub fn validate(&self) -> Result<(), GatehouseError> {
        check_common("route", &self.host, &self.path, self.prefix)?;
        RouteTarget::try_from(self).map(|_| ())
    }
}

impl RedirectRecord {
    pub fn validate(&self) -> Result<(), GatehouseError> {
        check_common("redirect", &self.host, &self.path, self.prefix)?;
        RedirectTarget::try_from(self).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(host: &str, path: &str, destination: &str) -> RouteRecord {
        RouteRecord {
            host: host.into(),
            path: path.into(),
            prefix: false,
            kind: RouteKind::Proxy,
            destination: destination.into(),
            content_type: None,
            forward_host: false,
        }
    }

    #[test]
    fn minimal_json_uses_defaults() {
        let record: RouteRecord = serde_json::from_str(
            r#"{"host": "example.com", "path": "/", "destination": "http://127.0.0.1:8080"}"#,
        )
        .unwrap();
        assert_eq!(record.kind, RouteKind::Proxy);
        assert!(!record.prefix);
        assert!(!record.forward_host);
    }

    #[test]
    fn unknown_fields_rejected() {
        let result: Result<RedirectRecord, _> = serde_json::from_str(
            r#"{"host": "a.com", "path": "/", "destination": "https://b.com", "colour": 1}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn validate_accepts_good_route() {
        assert!(route("example.com", "api", "http://backend:9000").validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_backend() {
        let err = route("example.com", "/", "not a url").validate().unwrap_err();
        assert!(matches!(err, GatehouseError::InvalidRecord { .. }));
    }

    #[test]
    fn validate_rejects_empty_host_and_bad_pattern() {
        assert!(route("", "/", "http://b").validate().is_err());
        assert!(route("a.com", "/*x/y", "http://b").validate().is_err());
    }

    #[test]
    fn validate_rejects_prefix_on_catch_all() {
        let mut record = route("a.com", "/files/*rest", "http://b");
        assert!(record.validate().is_ok());
        record.prefix = true;
        let err = record.validate().unwrap_err();
        assert!(matches!(err, GatehouseError::InvalidRecord { .. }));
    }

    #[test]
    fn validate_rejects_non_redirect_code() {
        let record = RedirectRecord {
            host: "a.com".into(),
            path: "/".into(),
            prefix: false,
            destination: "https://b.com".into(),
            code: 200,
        };
        assert!(record.validate().is_err());
    }

    #[test]
    fn normalize_adds_slash() {
        assert_eq!(normalize_path("api"), "/api");
        assert_eq!(normalize_path("/api"), "/api");
    }
}
