//! Integration tests for state assembly, the health endpoint, and graceful
//! shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use gatehouse::cmd::serve::build_state;
use gatehouse::config::model::{AuthConfig, Config, Listen};
use gatehouse::health::HealthResponse;
use gatehouse::router::{RouteKind, RouteRecord};
use gatehouse::server::{self, AppState};

fn test_config() -> Config {
    Config {
        listen: Listen {
            api: Some("127.0.0.1:0".into()),
            http: Some("127.0.0.1:0".into()),
        },
        database: ":memory:".into(),
        auth: AuthConfig {
            public_key: None,
            secret: Some("server-test".into()),
        },
        error_pages: None,
        certs: None,
        favicons: Default::default(),
        proxy: Default::default(),
        reload_interval_secs: 0,
    }
}

async fn start_test_server() -> (SocketAddr, Arc<AppState>, tokio::sync::oneshot::Sender<()>) {
    let state = Arc::new(build_state(&test_config()).await.unwrap());
    state.compilables.compile();
    state.compilables.settled().await;

    let router = server::build_api_router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
    });

    (addr, state, shutdown_tx)
}

#[tokio::test]
async fn health_endpoint_returns_healthy() {
    let (addr, _state, shutdown) = start_test_server().await;

    let url = format!("http://{addr}/health");
    let resp = reqwest::get(&url).await.unwrap();
    assert_eq!(resp.status(), 200);

    let health: HealthResponse = resp.json().await.unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.table.routes, 0);
    assert_eq!(health.table.certificates, 0);
    assert_eq!(health.stats.requests_forwarded, 0);
    assert_eq!(health.stats.requests_failed, 0);

    let names: Vec<&str> = health.providers.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(
        names,
        ["domains", "certificates", "favicons", "error_pages", "router"]
    );

    let _ = shutdown.send(());
}

#[tokio::test]
async fn health_reports_compiled_routes() {
    let (addr, state, shutdown) = start_test_server().await;
    state
        .router
        .insert_route(RouteRecord {
            host: "app.test".into(),
            path: "/docs".into(),
            prefix: true,
            kind: RouteKind::Static,
            destination: "docs".into(),
            content_type: None,
            forward_host: false,
        })
        .await
        .unwrap();
    state.compilables.settled().await;

    let health: HealthResponse = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health.table.routes, 1);

    let router = health.providers.iter().find(|p| p.name == "router").unwrap();
    assert!(router.runs >= 2);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn health_version_matches_crate() {
    let (addr, _state, shutdown) = start_test_server().await;

    let url = format!("http://{addr}/health");
    let health: HealthResponse = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn graceful_shutdown_works() {
    let (addr, _state, shutdown) = start_test_server().await;

    // Verify server is running
    let url = format!("http://{addr}/health");
    assert!(reqwest::get(&url).await.is_ok());

    // Send shutdown
    let _ = shutdown.send(());

    // Give it a moment to shut down
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    // Server should no longer accept connections
    let result = reqwest::get(&url).await;
    assert!(result.is_err());
}
