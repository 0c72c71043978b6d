//! Persistent storage for routes, redirects, domains and favicons.
//!
//! Providers read through the [`Storage`] trait so the rebuild logic can
//! be exercised against any backend. [`sqlite::SqliteStorage`] is the
//! production implementation.

pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatehouseError;
use crate::router::{RedirectRecord, RouteRecord};

pub use sqlite::SqliteStorage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub domain: String,
    pub active: bool,
}

/// Icon source URLs for one host. Any of the three may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaviconRecord {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub svg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub png: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ico: Option<String>,
}

// async_trait is required here because Storage is used as Arc<dyn Storage>
// and native async fn in traits does not support dyn dispatch.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn list_routes(&self) -> Result<Vec<RouteRecord>, GatehouseError>;
    async fn put_route(&self, record: &RouteRecord) -> Result<(), GatehouseError>;
    async fn delete_route(&self, host: &str, path: &str) -> Result<(), GatehouseError>;

    async fn list_redirects(&self) -> Result<Vec<RedirectRecord>, GatehouseError>;
    async fn put_redirect(&self, record: &RedirectRecord) -> Result<(), GatehouseError>;
    async fn delete_redirect(&self, host: &str, path: &str) -> Result<(), GatehouseError>;

    async fn list_domains(&self) -> Result<Vec<DomainRecord>, GatehouseError>;
    async fn put_domain(&self, domain: &str, active: bool) -> Result<(), GatehouseError>;

    async fn list_favicons(&self) -> Result<Vec<FaviconRecord>, GatehouseError>;
    async fn put_favicon(&self, record: &FaviconRecord) -> Result<(), GatehouseError>;
}
