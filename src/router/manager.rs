//! The routing provider: rebuilds a [`Router`] from storage and publishes it.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use super::record::normalize_path;
use super::target::{RedirectTarget, RouteTarget, SUBPATH};
use super::{RedirectRecord, RouteRecord, Router};
use crate::compile::{Coalescer, Compilable, Snapshot};
use crate::error::GatehouseError;
use crate::storage::Storage;

type Key = (String, String);

fn key(host: &str, path: &str) -> Key {
    (host.to_string(), normalize_path(path))
}

/// `path` for the record itself, plus `path/*subpath` for prefix records.
fn patterns(path: &str, prefix: bool) -> Vec<String> {
    let path = normalize_path(path);
    let mut out = vec![path.clone()];
    if prefix {
        out.push(format!("{}/*{SUBPATH}", path.trim_end_matches('/')));
    }
    out
}

/// A compiled routing table together with the records it was built from.
#[derive(Debug, Default)]
pub struct CompiledRoutes {
    pub router: Router,
    routes: HashMap<Key, RouteRecord>,
    redirects: HashMap<Key, RedirectRecord>,
}

impl CompiledRoutes {
    /// Build a complete table. Any invalid record or pattern conflict fails
    /// the whole build.
    pub fn build(
        routes: Vec<RouteRecord>,
        redirects: Vec<RedirectRecord>,
    ) -> Result<Self, GatehouseError> {
        let mut router = Router::new();

        for record in &routes {
            let target = RouteTarget::try_from(record)?;
            for pattern in patterns(&record.path, record.prefix) {
                router.add_route(&record.host, &pattern, target.clone())?;
            }
        }
        for record in &redirects {
            let target = RedirectTarget::try_from(record)?;
            for pattern in patterns(&record.path, record.prefix) {
                router.add_redirect(&record.host, &pattern, target.clone())?;
            }
        }

        Ok(Self {
            router,
            routes: routes
                .into_iter()
                .map(|r| (key(&r.host, &r.path), r))
                .collect(),
            redirects: redirects
                .into_iter()
                .map(|r| (key(&r.host, &r.path), r))
                .collect(),
        })
    }

    #[must_use]
    pub fn route_is_active(&self, record: &RouteRecord) -> bool {
        self.routes.get(&key(&record.host, &record.path)) == Some(record)
    }

    #[must_use]
    pub fn redirect_is_active(&self, record: &RedirectRecord) -> bool {
        self.redirects.get(&key(&record.host, &record.path)) == Some(record)
    }

    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn redirect_count(&self) -> usize {
        self.redirects.len()
    }
}

/// A stored record and whether the live table currently reflects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listed<R> {
    #[serde(flatten)]
    pub record: R,
    pub active: bool,
}

struct Shared {
    storage: Arc<dyn Storage>,
    snapshot: Snapshot<CompiledRoutes>,
    /// Serializes the check-then-store step of inserts.
    writes: Mutex<()>,
}

impl Shared {
    /// Build the table the stored records would produce with `route` or
    /// `redirect` put in place, without publishing it.
    async fn dry_run(
        &self,
        route: Option<&RouteRecord>,
        redirect: Option<&RedirectRecord>,
    ) -> Result<(), GatehouseError> {
        let mut routes = self.storage.list_routes().await?;
        let mut redirects = self.storage.list_redirects().await?;
        if let Some(candidate) = route {
            let k = key(&candidate.host, &candidate.path);
            routes.retain(|r| key(&r.host, &r.path) != k);
            routes.push(candidate.clone());
        }
        if let Some(candidate) = redirect {
            let k = key(&candidate.host, &candidate.path);
            redirects.retain(|r| key(&r.host, &r.path) != k);
            redirects.push(candidate.clone());
        }
        CompiledRoutes::build(routes, redirects).map(|_| ())
    }

    async fn rebuild(&self) -> Result<(), GatehouseError> {
        let routes = self.storage.list_routes().await?;
        let redirects = self.storage.list_redirects().await?;
        let compiled = CompiledRoutes::build(routes, redirects)?;
        tracing::info!(
            routes = compiled.route_count(),
            redirects = compiled.redirect_count(),
            hosts = compiled.router.route_hosts() + compiled.router.redirect_hosts(),
            "routing table compiled"
        );
        self.snapshot.publish(compiled).await;
        Ok(())
    }
}

#[derive(Clone)]
pub struct RouterManager {
    shared: Arc<Shared>,
    coalescer: Coalescer,
}

impl RouterManager {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        let shared = Arc::new(Shared {
            storage,
            snapshot: Snapshot::default(),
            writes: Mutex::new(()),
        });
        let for_rebuild = Arc::clone(&shared);
        let coalescer = Coalescer::new("router", move || {
            let shared = Arc::clone(&for_rebuild);
            async move { shared.rebuild().await }
        });
        Self { shared, coalescer }
    }

    /// The live table. Hold the `Arc` for the duration of one request.
    pub async fn table(&self) -> Arc<CompiledRoutes> {
        self.shared.snapshot.load().await
    }

    pub async fn all_routes(&self) -> Result<Vec<Listed<RouteRecord>>, GatehouseError> {
        let stored = self.shared.storage.list_routes().await?;
        let table = self.table().await;
        Ok(stored
            .into_iter()
            .map(|record| Listed {
                active: table.route_is_active(&record),
                record,
            })
            .collect())
    }

    pub async fn all_redirects(&self) -> Result<Vec<Listed<RedirectRecord>>, GatehouseError> {
        let stored = self.shared.storage.list_redirects().await?;
        let table = self.table().await;
        Ok(stored
            .into_iter()
            .map(|record| Listed {
                active: table.redirect_is_active(&record),
                record,
            })
            .collect())
    }

    /// Store a route once it compiles alongside every stored record. A
    /// record that would conflict is rejected and nothing is written.
    pub async fn insert_route(&self, mut record: RouteRecord) -> Result<(), GatehouseError> {
        record.validate()?;
        record.path = normalize_path(&record.path);
        let _guard = self.shared.writes.lock().await;
        self.shared.dry_run(Some(&record), None).await?;
        self.shared.storage.put_route(&record).await?;
        self.compile();
        Ok(())
    }

    pub async fn delete_route(&self, host: &str, path: &str) -> Result<(), GatehouseError> {
        self.shared.storage.delete_route(host, path).await?;
        self.compile();
        Ok(())
    }

    pub async fn insert_redirect(&self, mut record: RedirectRecord) -> Result<(), GatehouseError> {
        record.validate()?;
        record.path = normalize_path(&record.path);
        let _guard = self.shared.writes.lock().await;
        self.shared.dry_run(None, Some(&record)).await?;
        self.shared.storage.put_redirect(&record).await?;
        self.compile();
        Ok(())
    }

    pub async fn delete_redirect(&self, host: &str, path: &str) -> Result<(), GatehouseError> {
        self.shared.storage.delete_redirect(host, path).await?;
        self.compile();
        Ok(())
    }
}

impl Compilable for RouterManager {
    fn coalescer(&self) -> &Coalescer {
        &self.coalescer
    }
}
