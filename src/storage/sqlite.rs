//! SQLite-backed [`Storage`] implementation.
//!
//! Tables are auto-created on open. Paths are stored already normalised
//! (leading `/`), so the `(host, path)` primary keys enforce the
//! one-registration-per-pattern rule for exact duplicates.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use super::{DomainRecord, FaviconRecord, Storage};
use crate::error::GatehouseError;
use crate::router::record::normalize_path;
use crate::router::{RedirectRecord, RouteKind, RouteRecord};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS domains (\
        domain TEXT PRIMARY KEY, \
        active INTEGER NOT NULL DEFAULT 1\
    )",
    "CREATE TABLE IF NOT EXISTS routes (\
        host TEXT NOT NULL, \
        path TEXT NOT NULL, \
        prefix INTEGER NOT NULL DEFAULT 0, \
        kind TEXT NOT NULL DEFAULT 'proxy', \
        destination TEXT NOT NULL, \
        content_type TEXT, \
        forward_host INTEGER NOT NULL DEFAULT 0, \
        PRIMARY KEY (host, path)\
    )",
    "CREATE TABLE IF NOT EXISTS redirects (\
        host TEXT NOT NULL, \
        path TEXT NOT NULL, \
        prefix INTEGER NOT NULL DEFAULT 0, \
        destination TEXT NOT NULL, \
        code INTEGER NOT NULL DEFAULT 0, \
        PRIMARY KEY (host, path)\
    )",
    "CREATE TABLE IF NOT EXISTS favicons (\
        host TEXT PRIMARY KEY, \
        svg TEXT, \
        png TEXT, \
        ico TEXT\
    )",
];

#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub async fn open(path: &Path) -> Result<Self, GatehouseError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        Self::with_pool(pool).await
    }

    /// Private in-memory database. A single, never-recycled connection keeps
    /// the data alive for the lifetime of the pool.
    pub async fn in_memory() -> Result<Self, GatehouseError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, GatehouseError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn list_routes(&self) -> Result<Vec<RouteRecord>, GatehouseError> {
        let rows = sqlx::query(
            "SELECT host, path, prefix, kind, destination, content_type, forward_host \
             FROM routes ORDER BY host, path",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let kind: String = row.try_get("kind")?;
                let host: String = row.try_get("host")?;
                let path: String = row.try_get("path")?;
                let kind = RouteKind::parse(&kind).ok_or_else(|| GatehouseError::InvalidRecord {
                    table: "route",
                    host: host.clone(),
                    path: path.clone(),
                    message: format!("unknown kind '{kind}'"),
                })?;
                Ok(RouteRecord {
                    host,
                    path,
                    prefix: row.try_get("prefix")?,
                    kind,
                    destination: row.try_get("destination")?,
                    content_type: row.try_get("content_type")?,
                    forward_host: row.try_get("forward_host")?,
                })
            })
            .collect()
    }

    async fn put_route(&self, record: &RouteRecord) -> Result<(), GatehouseError> {
        sqlx::query(
            "INSERT INTO routes (host, path, prefix, kind, destination, content_type, forward_host) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (host, path) DO UPDATE SET \
             prefix = excluded.prefix, kind = excluded.kind, destination = excluded.destination, \
             content_type = excluded.content_type, forward_host = excluded.forward_host",
        )
        .bind(&record.host)
        .bind(normalize_path(&record.path))
        .bind(record.prefix)
        .bind(record.kind.as_str())
        .bind(&record.destination)
        .bind(&record.content_type)
        .bind(record.forward_host)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_route(&self, host: &str, path: &str) -> Result<(), GatehouseError> {
        sqlx::query("DELETE FROM routes WHERE host = ? AND path = ?")
            .bind(host)
            .bind(normalize_path(path))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_redirects(&self) -> Result<Vec<RedirectRecord>, GatehouseError> {
        let rows = sqlx::query(
            "SELECT host, path, prefix, destination, code FROM redirects ORDER BY host, path",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let code: i64 = row.try_get("code")?;
                let host: String = row.try_get("host")?;
                let path: String = row.try_get("path")?;
                let code = u16::try_from(code).map_err(|_| GatehouseError::InvalidRecord {
                    table: "redirect",
                    host: host.clone(),
                    path: path.clone(),
                    message: format!("status code {code} out of range"),
                })?;
                Ok(RedirectRecord {
                    host,
                    path,
                    prefix: row.try_get("prefix")?,
                    destination: row.try_get("destination")?,
                    code,
                })
            })
            .collect()
    }

    async fn put_redirect(&self, record: &RedirectRecord) -> Result<(), GatehouseError> {
        sqlx::query(
            "INSERT INTO redirects (host, path, prefix, destination, code) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (host, path) DO UPDATE SET \
             prefix = excluded.prefix, destination = excluded.destination, code = excluded.code",
        )
        .bind(&record.host)
        .bind(normalize_path(&record.path))
        .bind(record.prefix)
        .bind(&record.destination)
        .bind(i64::from(record.code))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_redirect(&self, host: &str, path: &str) -> Result<(), GatehouseError> {
        sqlx::query("DELETE FROM redirects WHERE host = ? AND path = ?")
            .bind(host)
            .bind(normalize_path(path))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_domains(&self) -> Result<Vec<DomainRecord>, GatehouseError> {
        let rows: Vec<(String, bool)> =
            sqlx::query_as("SELECT domain, active FROM domains ORDER BY domain")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(domain, active)| DomainRecord { domain, active })
            .collect())
    }

    async fn put_domain(&self, domain: &str, active: bool) -> Result<(), GatehouseError> {
        sqlx::query(
            "INSERT INTO domains (domain, active) VALUES (?, ?) \
             ON CONFLICT (domain) DO UPDATE SET active = excluded.active",
        )
        .bind(domain)
        .bind(active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_favicons(&self) -> Result<Vec<FaviconRecord>, GatehouseError> {
        let rows: Vec<(String, Option<String>, Option<String>, Option<String>)> =
            sqlx::query_as("SELECT host, svg, png, ico FROM favicons ORDER BY host")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(host, svg, png, ico)| FaviconRecord { host, svg, png, ico })
            .collect())
    }

    async fn put_favicon(&self, record: &FaviconRecord) -> Result<(), GatehouseError> {
        sqlx::query(
            "INSERT INTO favicons (host, svg, png, ico) VALUES (?, ?, ?, ?) \
             ON CONFLICT (host) DO UPDATE SET \
             svg = excluded.svg, png = excluded.png, ico = excluded.ico",
        )
        .bind(&record.host)
        .bind(&record.svg)
        .bind(&record.png)
        .bind(&record.ico)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
