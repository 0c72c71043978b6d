//! Host-and-path routing table and the dispatch algorithm.
//!
//! A [`Router`] holds two independent tables keyed by literal host: one
//! for redirects and one for routes, each mapping to a [`PathRouter`].
//! [`Router::dispatch`] decides what a request gets:
//!
//! 1. redirect table for the exact host, then route table for the exact host;
//! 2. if the host has no dot, not found;
//! 3. otherwise the same two lookups for the single-level wildcard host
//!    (`a.b.com` becomes `*.b.com`, never `*.com`);
//! 4. not found.
//!
//! Redirects win over routes at the same host, and any exact-host match
//! wins over any wildcard match. Only the path is matched; the request
//! method is left to the target.
//!
//! [`RouterManager`] is the compilable provider that rebuilds a `Router`
//! from storage.

pub mod manager;
pub mod path;
pub mod record;
pub mod target;

use std::collections::HashMap;

use crate::domain::wildcard_form;
use record::normalize_path;

pub use manager::{CompiledRoutes, Listed, RouterManager};
pub use path::{Lookup, Params, PathRouter};
pub use record::{RecordKey, RedirectRecord, RouteKind, RouteRecord};
pub use target::{ProxyTarget, RedirectTarget, RouteTarget, StaticTarget, SUBPATH};

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RouterError {
    #[error("pattern '{pattern}' conflicts with existing pattern '{existing}'")]
    Conflict { pattern: String, existing: String },

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        pattern: String,
        reason: &'static str,
    },
}

/// Outcome of [`Router::dispatch`].
#[derive(Debug)]
pub enum Dispatch<'a> {
    Redirect {
        target: &'a RedirectTarget,
        params: Params,
    },
    Route {
        target: &'a RouteTarget,
        params: Params,
    },
    NotFound,
}

#[derive(Debug, Clone, Default)]
pub struct Router {
    route: HashMap<String, PathRouter<RouteTarget>>,
    redirect: HashMap<String, PathRouter<RedirectTarget>>,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route every request for `host` at `/` to `target`.
    pub fn add_service(&mut self, host: &str, target: RouteTarget) -> Result<(), RouterError> {
        self.add_route(host, "/", target)
    }

    pub fn add_route(
        &mut self,
        host: &str,
        path: &str,
        target: RouteTarget,
    ) -> Result<(), RouterError> {
        self.route
            .entry(host.to_string())
            .or_default()
            .insert(&normalize_path(path), target)
    }

    pub fn add_redirect(
        &mut self,
        host: &str,
        path: &str,
        target: RedirectTarget,
    ) -> Result<(), RouterError> {
        self.redirect
            .entry(host.to_string())
            .or_default()
            .insert(&normalize_path(path), target)
    }

    pub fn dispatch(&self, host: &str, path: &str) -> Dispatch<'_> {
        if let Some(found) = self.dispatch_exact(host, path) {
            return found;
        }
        if !host.contains('.') {
            return Dispatch::NotFound;
        }
        let wildcard = wildcard_form(host);
        self.dispatch_exact(&wildcard, path)
            .unwrap_or(Dispatch::NotFound)
    }

    fn dispatch_exact(&self, host: &str, path: &str) -> Option<Dispatch<'_>> {
        if let Some(table) = self.redirect.get(host) {
            let Lookup { value, params, .. } = table.lookup(path);
            if let Some(target) = value {
                return Some(Dispatch::Redirect { target, params });
            }
        }
        if let Some(table) = self.route.get(host) {
            let Lookup { value, params, .. } = table.lookup(path);
            if let Some(target) = value {
                return Some(Dispatch::Route { target, params });
            }
        }
        None
    }

    #[must_use]
    pub fn route_hosts(&self) -> usize {
        self.route.len()
    }

    #[must_use]
    pub fn redirect_hosts(&self) -> usize {
        self.redirect.len()
    }
}
