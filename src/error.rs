//! Unified error types for Gatehouse.
//!
//! Defines [`GatehouseError`] (the main crate error enum) and
//! [`ValidationError`] for startup config validation failures. Both use
//! `thiserror` for `Display` and `Error` derives. Routing-table errors
//! live in [`RouterError`](crate::router::RouterError) and convert into
//! [`GatehouseError::Routing`].

use std::path::PathBuf;

use crate::router::RouterError;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "  {}: {}", self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

fn format_errors(errors: &[ValidationError]) -> String {
    use std::fmt::Write;
    let mut buf = String::new();
    for (i, e) in errors.iter().enumerate() {
        if i > 0 {
            buf.push('\n');
        }
        // write! to String is infallible (only fails on OOM which is unrecoverable)
        let _ = write!(buf, "{e}");
    }
    buf
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GatehouseError {
    #[error("Config file not found: {}", path.display())]
    ConfigFileNotFound { path: PathBuf },

    #[error("Config parse error in {path}:\n  {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Config validation failed:\n{}", format_errors(.errors))]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("Unsupported config format: '{0}'")]
    UnsupportedFormat(String),

    #[error("Invalid address: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    #[error("Invalid URI: {source}")]
    UriParse {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("HTTP request failed: {source}")]
    HttpRequest {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Health check failed with status {0}")]
    HealthCheckFailed(hyper::StatusCode),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid {table} record {host}{path}: {message}")]
    InvalidRecord {
        table: &'static str,
        host: String,
        path: String,
        message: String,
    },

    #[error("Routing table error: {0}")]
    Routing(#[from] RouterError),

    #[error("Certificate error for '{domain}': {message}")]
    Certificate { domain: String, message: String },

    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("SVG conversion failed: {0}")]
    Transcode(String),

    #[error("Invalid token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}
