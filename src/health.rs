//! `GET /health` endpoint handler.
//!
//! Returns a [`HealthResponse`] JSON payload containing the version, uptime,
//! compiled table sizes, per-provider rebuild counters, and cumulative
//! gateway request statistics. The endpoint needs no token.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::compile::CoalescerStats;
use crate::server::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub git: String,
    pub uptime_seconds: u64,
    pub table: TableHealth,
    pub providers: Vec<CoalescerStats>,
    pub stats: StatsResponse,
}

#[derive(Serialize, Deserialize)]
pub struct TableHealth {
    pub routes: usize,
    pub redirects: usize,
    pub certificates: usize,
}

#[derive(Serialize, Deserialize)]
pub struct StatsResponse {
    pub requests_forwarded: u64,
    pub requests_failed: u64,
    pub requests_redirected: u64,
    pub requests_not_found: u64,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let table = state.router.table().await;
    let providers = state.compilables.stats();
    let degraded = providers.iter().any(|p| p.failures > 0 && p.runs == p.failures);

    Json(HealthResponse {
        status: if degraded { "degraded" } else { "healthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git: env!("GATEHOUSE_GIT_SHORT").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        table: TableHealth {
            routes: table.route_count(),
            redirects: table.redirect_count(),
            certificates: state.certs.count().await,
        },
        providers,
        stats: StatsResponse {
            requests_forwarded: state.stats.forwarded.load(Ordering::Relaxed),
            requests_failed: state.stats.failed.load(Ordering::Relaxed),
            requests_redirected: state.stats.redirected.load(Ordering::Relaxed),
            requests_not_found: state.stats.not_found.load(Ordering::Relaxed),
        },
    })
}
