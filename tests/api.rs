//! Integration tests for the admin API: token checks, record mutation,
//! the active flag, domains and ACME challenges.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};

use gatehouse::auth::{sign_hs256, Claims, TokenVerifier};
use gatehouse::error::GatehouseError;
use gatehouse::health::HealthResponse;
use gatehouse::providers::{IconFetcher, SvgConverter};
use gatehouse::server::{self, AppState, Collaborators};
use gatehouse::storage::{SqliteStorage, Storage};

const SECRET: &[u8] = b"api-test-secret";

struct NoFetch;

#[async_trait]
impl IconFetcher for NoFetch {
    async fn fetch(&self, url: &str) -> Result<Bytes, GatehouseError> {
        Err(GatehouseError::Fetch {
            url: url.to_string(),
            message: "offline".into(),
        })
    }
}

#[async_trait]
impl SvgConverter for NoFetch {
    async fn svg_to_png(&self, _svg: &[u8]) -> Result<Bytes, GatehouseError> {
        Err(GatehouseError::Transcode("offline".into()))
    }
}

async fn start_api() -> (SocketAddr, Arc<AppState>, tokio::sync::oneshot::Sender<()>) {
    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::in_memory().await.unwrap());
    let state = Arc::new(AppState::assemble(Collaborators {
        storage,
        verifier: TokenVerifier::from_secret(SECRET),
        http_client: server::build_http_client(),
        icon_fetcher: Arc::new(NoFetch),
        svg_converter: Arc::new(NoFetch),
        cert_dirs: None,
        error_pages: None,
        proxy_timeout: Duration::from_secs(2),
    }));
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

fn token(perms: &[&str]) -> String {
    let exp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() + 3600;
    sign_hs256(
        SECRET,
        &Claims {
            sub: "operator".into(),
            exp,
            perms: perms.iter().map(|p| (*p).to_string()).collect(),
        },
    )
    .unwrap()
}

fn route_json(host: &str) -> Value {
    json!({
        "host": host,
        "path": "/api",
        "prefix": true,
        "destination": "http://127.0.0.1:9000/",
    })
}

#[tokio::test]
async fn health_needs_no_token() {
    let (addr, _state, shutdown) = start_api().await;

    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let health: HealthResponse = resp.json().await.unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    assert_eq!(health.providers.len(), 5);
    assert!(health.providers.iter().all(|p| p.runs >= 1 && p.failures == 0));
    assert_eq!(health.table.routes, 0);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn compile_rejects_missing_and_forged_tokens() {
    let (addr, _state, shutdown) = start_api().await;
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/compile");

    let missing = client.post(&url).send().await.unwrap();
    assert_eq!(missing.status(), 401);
    let body: Value = missing.json().await.unwrap();
    assert!(body["error"].is_string());

    let forged = sign_hs256(
        b"wrong-secret",
        &Claims {
            sub: "mallory".into(),
            exp: u64::MAX / 2,
            perms: vec!["gatehouse:compile".into()],
        },
    )
    .unwrap();
    let resp = client.post(&url).bearer_auth(forged).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .post(&url)
        .bearer_auth(token(&["gatehouse:route"]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = client
        .post(&url)
        .bearer_auth(token(&["gatehouse:compile"]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn route_mutations_need_ownership() {
    let (addr, _state, shutdown) = start_api().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/route"))
        .bearer_auth(token(&["gatehouse:route", "owns=other.test"]))
        .json(&route_json("shop.app.test"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn created_route_becomes_active_then_deleted() {
    let (addr, state, shutdown) = start_api().await;
    let client = reqwest::Client::new();
    let auth = token(&["gatehouse:route", "owns=app.test"]);

    let resp = client
        .post(format!("http://{addr}/route"))
        .bearer_auth(&auth)
        .json(&route_json("shop.app.test"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    state.compilables.settled().await;

    let listed: Value = client
        .get(format!("http://{addr}/route"))
        .bearer_auth(&auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let routes = listed["routes"].as_array().unwrap();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0]["host"], "shop.app.test");
    assert_eq!(routes[0]["active"], true);

    let resp = client
        .delete(format!("http://{addr}/route"))
        .bearer_auth(&auth)
        .json(&json!({ "host": "shop.app.test", "path": "/api" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    state.compilables.settled().await;

    let listed: Value = client
        .get(format!("http://{addr}/route"))
        .bearer_auth(&auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(listed["routes"].as_array().unwrap().is_empty());
    assert_eq!(state.router.table().await.route_count(), 0);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn invalid_records_are_rejected_with_400() {
    let (addr, _state, shutdown) = start_api().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/route"))
        .bearer_auth(token(&["gatehouse:route", "owns=app.test"]))
        .json(&json!({
            "host": "app.test",
            "path": "/",
            "destination": "ftp://files.app.test/",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("http://{addr}/redirect"))
        .bearer_auth(token(&["gatehouse:redirect", "owns=app.test"]))
        .json(&json!({
            "host": "app.test",
            "path": "/old",
            "destination": "https://app.test/new",
            "code": 200,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn conflicting_route_is_rejected_and_other_hosts_still_compile() {
    let (addr, state, shutdown) = start_api().await;
    let client = reqwest::Client::new();
    let post = |host: &str, path: &str, owner: &str| {
        client
            .post(format!("http://{addr}/route"))
            .bearer_auth(token(&["gatehouse:route", &format!("owns={owner}")]))
            .json(&json!({
                "host": host,
                "path": path,
                "destination": "http://127.0.0.1:9000/",
            }))
            .send()
    };

    assert_eq!(post("app.test", "/u/:id", "app.test").await.unwrap().status(), 202);
    assert_eq!(post("app.test", "/u/:name", "app.test").await.unwrap().status(), 400);
    assert_eq!(post("other.test", "/", "other.test").await.unwrap().status(), 202);
    state.compilables.settled().await;

    let table = state.router.table().await;
    assert_eq!(table.route_count(), 2);
    assert!(matches!(
        table.router.dispatch("other.test", "/"),
        gatehouse::router::Dispatch::Route { .. }
    ));
    let router = state
        .compilables
        .stats()
        .into_iter()
        .find(|s| s.name == "router")
        .unwrap();
    assert_eq!(router.failures, 0);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn prefix_on_catch_all_path_is_rejected() {
    let (addr, state, shutdown) = start_api().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/route"))
        .bearer_auth(token(&["gatehouse:route", "owns=app.test"]))
        .json(&json!({
            "host": "app.test",
            "path": "/files/*rest",
            "prefix": true,
            "destination": "http://127.0.0.1:9000/",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("http://{addr}/route"))
        .bearer_auth(token(&["gatehouse:route", "owns=other.test"]))
        .json(&route_json("other.test"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    state.compilables.settled().await;
    assert_eq!(state.router.table().await.route_count(), 1);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn redirects_are_listed_with_active_flag() {
    let (addr, state, shutdown) = start_api().await;
    let client = reqwest::Client::new();
    let auth = token(&["gatehouse:redirect", "owns=app.test"]);

    let resp = client
        .post(format!("http://{addr}/redirect"))
        .bearer_auth(&auth)
        .json(&json!({
            "host": "app.test",
            "path": "/old",
            "destination": "https://app.test/new",
            "code": 308,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    state.compilables.settled().await;

    let listed: Value = client
        .get(format!("http://{addr}/redirect"))
        .bearer_auth(&auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["redirects"][0]["code"], 308);
    assert_eq!(listed["redirects"][0]["active"], true);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn acme_challenges_need_an_allowed_domain() {
    let (addr, state, shutdown) = start_api().await;
    let client = reqwest::Client::new();
    let acme = token(&["gatehouse:acme-challenge"]);

    let resp = client
        .put(format!("http://{addr}/acme-challenge/app.test/tok/tok.thumb"))
        .bearer_auth(&acme)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .put(format!("http://{addr}/domain/app.test"))
        .bearer_auth(token(&["gatehouse:domains", "owns=app.test"]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    state.compilables.settled().await;
    assert!(state.domains.is_valid("app.test").await);

    let resp = client
        .put(format!("http://{addr}/acme-challenge/app.test/tok/tok.thumb"))
        .bearer_auth(&acme)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    assert_eq!(
        state.acme.get("app.test", "tok").await.as_deref(),
        Some("tok.thumb")
    );

    let resp = client
        .delete(format!("http://{addr}/acme-challenge/app.test/tok"))
        .bearer_auth(&acme)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    assert!(state.acme.get("app.test", "tok").await.is_none());

    let _ = shutdown.send(());
}

#[tokio::test]
async fn deleting_a_domain_disables_it() {
    let (addr, state, shutdown) = start_api().await;
    let client = reqwest::Client::new();
    let auth = token(&["gatehouse:domains", "owns=app.test"]);

    for method in [reqwest::Method::PUT, reqwest::Method::DELETE] {
        let resp = client
            .request(method, format!("http://{addr}/domain/app.test"))
            .bearer_auth(&auth)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 202);
        state.compilables.settled().await;
    }
    assert!(!state.domains.is_valid("app.test").await);

    let _ = shutdown.send(());
}
