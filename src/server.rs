//! Server assembly: shared application state, the two axum routers, the
//! shared HTTP client, and graceful shutdown.
//!
//! [`AppState::assemble`] wires storage and every provider together
//! explicitly. [`build_gateway_router`] serves public traffic and
//! [`build_api_router`] serves the administrative API.

use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::{delete, get, post, put};
use axum::Router;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::acme::AcmeChallenges;
use crate::api;
use crate::auth::TokenVerifier;
use crate::compile::{Compilable, MultiCompilable};
use crate::health::health_handler;
use crate::providers::{
    CertDirs, CertificateProvider, DomainProvider, ErrorPageProvider, FaviconProvider,
    IconFetcher, SvgConverter,
};
use crate::proxy;
use crate::router::RouterManager;
use crate::storage::Storage;

/// Public gateway counters, reported by `/health`.
#[derive(Debug)]
pub struct Stats {
    pub forwarded: AtomicU64,
    pub failed: AtomicU64,
    pub redirected: AtomicU64,
    pub not_found: AtomicU64,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            forwarded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            redirected: AtomicU64::new(0),
            not_found: AtomicU64::new(0),
        }
    }
}

pub type HttpsConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;
pub type HttpClient = Client<HttpsConnector, http_body_util::Full<bytes::Bytes>>;

/// Everything [`AppState::assemble`] needs from the outside.
pub struct Collaborators {
    pub storage: Arc<dyn Storage>,
    pub verifier: TokenVerifier,
    pub http_client: HttpClient,
    pub icon_fetcher: Arc<dyn IconFetcher>,
    pub svg_converter: Arc<dyn SvgConverter>,
    pub cert_dirs: Option<CertDirs>,
    pub error_pages: Option<PathBuf>,
    pub proxy_timeout: Duration,
}

pub struct AppState {
    pub router: RouterManager,
    pub domains: DomainProvider,
    pub certs: CertificateProvider,
    pub favicons: FaviconProvider,
    pub error_pages: ErrorPageProvider,
    pub compilables: MultiCompilable,
    pub acme: AcmeChallenges,
    pub verifier: TokenVerifier,
    pub http_client: HttpClient,
    pub proxy_timeout: Duration,
    pub start_time: Instant,
    pub stats: Stats,
}

impl AppState {
    /// Build every provider over the shared storage. Nothing is compiled
    /// yet; call `compilables.compile()` once the state is in place.
    #[must_use]
    pub fn assemble(c: Collaborators) -> Self {
        let domains = DomainProvider::new(Arc::clone(&c.storage));
        let certs = CertificateProvider::new(c.cert_dirs);
        let favicons = FaviconProvider::new(
            Arc::clone(&c.storage),
            c.icon_fetcher,
            c.svg_converter,
        );
        let error_pages = ErrorPageProvider::new(c.error_pages);
        let router = RouterManager::new(c.storage);

        let compilables = MultiCompilable::new(vec![
            Arc::new(domains.clone()) as Arc<dyn Compilable>,
            Arc::new(certs.clone()),
            Arc::new(favicons.clone()),
            Arc::new(error_pages.clone()),
            Arc::new(router.clone()),
        ]);

        Self {
            router,
            domains,
            certs,
            favicons,
            error_pages,
            compilables,
            acme: AcmeChallenges::new(),
            verifier: c.verifier,
            http_client: c.http_client,
            proxy_timeout: c.proxy_timeout,
            start_time: Instant::now(),
            stats: Stats::new(),
        }
    }
}

#[must_use]
pub fn build_http_client() -> HttpClient {
    // When multiple rustls crypto providers are compiled in, rustls cannot
    // auto-detect which one to use. Explicitly install `ring`.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(30))
        .build(https)
}

/// Public listener: ACME challenges, favicons, then the routing table.
pub fn build_gateway_router(state: Arc<AppState>, max_body: usize) -> Router {
    Router::new()
        .fallback(proxy::gateway_handler)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(max_body)),
        )
        .with_state(state)
}

/// Administrative listener.
pub fn build_api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/compile", post(api::compile))
        .route(
            "/domain/{domain}",
            put(api::put_domain).delete(api::delete_domain),
        )
        .route(
            "/route",
            get(api::list_routes)
                .post(api::create_route)
                .delete(api::delete_route),
        )
        .route(
            "/redirect",
            get(api::list_redirects)
                .post(api::create_redirect)
                .delete(api::delete_redirect),
        )
        .route(
            "/acme-challenge/{domain}/{key}/{value}",
            put(api::put_acme_challenge),
        )
        .route(
            "/acme-challenge/{domain}/{key}",
            delete(api::delete_acme_challenge),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
