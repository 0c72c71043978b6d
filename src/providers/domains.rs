//! Allow-list of domains the gateway is willing to serve.

use std::collections::HashSet;
use std::sync::Arc;

use crate::compile::{Coalescer, Compilable, Snapshot};
use crate::domain::{drop_port, wildcard_form};
use crate::error::GatehouseError;
use crate::storage::Storage;

struct Shared {
    storage: Arc<dyn Storage>,
    active: Snapshot<HashSet<String>>,
}

#[derive(Clone)]
pub struct DomainProvider {
    shared: Arc<Shared>,
    coalescer: Coalescer,
}

impl DomainProvider {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        let shared = Arc::new(Shared {
            storage,
            active: Snapshot::default(),
        });
        let for_rebuild = Arc::clone(&shared);
        let coalescer = Coalescer::new("domains", move || {
            let shared = Arc::clone(&for_rebuild);
            async move {
                let domains: HashSet<String> = shared
                    .storage
                    .list_domains()
                    .await?
                    .into_iter()
                    .filter(|d| d.active)
                    .map(|d| d.domain)
                    .collect();
                tracing::info!(domains = domains.len(), "domain allow-list compiled");
                shared.active.publish(domains).await;
                Ok(())
            }
        });
        Self { shared, coalescer }
    }

    /// `host` (port ignored) is listed, or its single-level wildcard form is.
    pub async fn is_valid(&self, host: &str) -> bool {
        let Some(domain) = drop_port(host) else {
            return false;
        };
        let active = self.shared.active.load().await;
        active.contains(domain) || active.contains(&wildcard_form(domain))
    }

    /// Store the domain's active flag and schedule a rebuild.
    pub async fn put(&self, domain: &str, active: bool) -> Result<(), GatehouseError> {
        self.shared.storage.put_domain(domain, active).await?;
        self.compile();
        Ok(())
    }
}

impl Compilable for DomainProvider {
    fn coalescer(&self) -> &Coalescer {
        &self.coalescer
    }
}
