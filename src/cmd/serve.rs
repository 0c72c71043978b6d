//! `gatehouse serve`: start the public gateway and the admin API.
//!
//! Loads the config file, assembles storage and every provider, runs the
//! initial compile, then serves both listeners until Ctrl+C / SIGTERM. An
//! optional background loop recompiles everything on a fixed interval.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::auth::TokenVerifier;
use crate::cli::ServeArgs;
use crate::config::{self, model::Config};
use crate::error::GatehouseError;
use crate::logging;
use crate::providers::{CertDirs, HttpFetcher, InkscapeConverter};
use crate::server::{self, AppState, Collaborators};
use crate::storage::{SqliteStorage, Storage};

pub async fn execute(args: ServeArgs) -> Result<(), GatehouseError> {
    logging::init(&args.log_level, logging::resolve_format(args.pretty, args.json));

    let config = config::load(&args.config).await?;
    let state = Arc::new(build_state(&config).await?);
    state.compilables.compile();

    // Dropping or signalling shutdown_tx stops both listeners and the reload loop.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut servers: Vec<JoinHandle<std::io::Result<()>>> = Vec::new();

    if let Some(addr) = &config.listen.http {
        let addr: SocketAddr = addr.parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let router = server::build_gateway_router(Arc::clone(&state), config.proxy.max_body);
        let stop = stopped(shutdown_rx.clone());
        tracing::info!(addr = %addr, "gateway listening");
        servers.push(tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(stop)
            .await
        }));
    }

    if let Some(addr) = &config.listen.api {
        let addr: SocketAddr = addr.parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let router = server::build_api_router(Arc::clone(&state));
        let stop = stopped(shutdown_rx.clone());
        tracing::info!(addr = %addr, "admin API listening");
        servers.push(tokio::spawn(async move {
            axum::serve(listener, router).with_graceful_shutdown(stop).await
        }));
    }

    let reload_handle = (config.reload_interval_secs > 0).then(|| {
        let state = Arc::clone(&state);
        let interval = Duration::from_secs(config.reload_interval_secs);
        tokio::spawn(reload_loop(state, interval, shutdown_rx))
    });

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        reload_interval_secs = config.reload_interval_secs,
        "gatehouse started"
    );

    server::shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    for handle in servers {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "listener failed"),
            Err(e) => tracing::error!(error = %e, "listener task failed"),
        }
    }
    if let Some(handle) = reload_handle {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "reload task failed");
        }
    }

    tracing::info!("gatehouse stopped");
    Ok(())
}

/// Open storage, build the collaborators named by `config`, and assemble
/// the application state. Nothing is compiled yet.
pub async fn build_state(config: &Config) -> Result<AppState, GatehouseError> {
    let storage: Arc<dyn Storage> = if config.is_in_memory() {
        Arc::new(SqliteStorage::in_memory().await?)
    } else {
        Arc::new(SqliteStorage::open(&config.database).await?)
    };

    let verifier = match (&config.auth.public_key, &config.auth.secret) {
        (Some(path), _) => TokenVerifier::from_rsa_pem(&tokio::fs::read(path).await?)?,
        (None, Some(secret)) => TokenVerifier::from_secret(secret.as_bytes()),
        (None, None) => {
            return Err(GatehouseError::ConfigValidation {
                errors: vec![crate::error::ValidationError {
                    field: "auth".into(),
                    message: "one of auth.public_key or auth.secret is required".into(),
                    suggestion: None,
                }],
            })
        }
    };

    let http_client = server::build_http_client();

    Ok(AppState::assemble(Collaborators {
        storage,
        verifier,
        icon_fetcher: Arc::new(HttpFetcher::new(http_client.clone())),
        svg_converter: Arc::new(InkscapeConverter::new(config.favicons.inkscape.clone())),
        http_client,
        cert_dirs: config.certs.as_ref().map(|c| CertDirs {
            cert_dir: c.cert_dir.clone(),
            key_dir: c.key_dir.clone(),
        }),
        error_pages: config.error_pages.clone(),
        proxy_timeout: Duration::from_millis(config.proxy.timeout_ms),
    }))
}

async fn stopped(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn reload_loop(
    state: Arc<AppState>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // Skip first immediate tick

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => {
                tracing::debug!("reload loop shutting down");
                return;
            }
        }

        tracing::debug!("periodic reload");
        state.compilables.compile();
    }
}
