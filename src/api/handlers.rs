use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use super::{ApiError, Authorized};
use crate::auth::{PERM_ACME_CHALLENGE, PERM_COMPILE, PERM_DOMAINS, PERM_REDIRECT, PERM_ROUTE};
use crate::router::{RecordKey, RedirectRecord, RouteRecord};
use crate::server::AppState;

type Accepted = Result<StatusCode, ApiError>;

pub async fn compile(auth: Authorized, State(state): State<Arc<AppState>>) -> Accepted {
    auth.require(PERM_COMPILE)?;
    state.compilables.compile();
    Ok(StatusCode::ACCEPTED)
}

async fn set_domain(auth: &Authorized, state: &AppState, domain: &str, active: bool) -> Accepted {
    auth.require(PERM_DOMAINS)?;
    auth.require_owner(domain)?;
    state.domains.put(domain, active).await?;
    tracing::info!(domain = %domain, active, subject = %auth.0.sub, "domain updated");
    Ok(StatusCode::ACCEPTED)
}

pub async fn put_domain(
    auth: Authorized,
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
) -> Accepted {
    set_domain(&auth, &state, &domain, true).await
}

pub async fn delete_domain(
    auth: Authorized,
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
) -> Accepted {
    set_domain(&auth, &state, &domain, false).await
}

pub async fn list_routes(
    auth: Authorized,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    auth.require(PERM_ROUTE)?;
    let routes = state.router.all_routes().await?;
    Ok(Json(json!({ "routes": routes })))
}

pub async fn create_route(
    auth: Authorized,
    State(state): State<Arc<AppState>>,
    Json(record): Json<RouteRecord>,
) -> Accepted {
    auth.require(PERM_ROUTE)?;
    auth.require_owner(&record.host)?;
    tracing::info!(host = %record.host, path = %record.path, subject = %auth.0.sub, "route created");
    state.router.insert_route(record).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn delete_route(
    auth: Authorized,
    State(state): State<Arc<AppState>>,
    Json(key): Json<RecordKey>,
) -> Accepted {
    auth.require(PERM_ROUTE)?;
    auth.require_owner(&key.host)?;
    state.router.delete_route(&key.host, &key.path).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn list_redirects(
    auth: Authorized,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    auth.require(PERM_REDIRECT)?;
    let redirects = state.router.all_redirects().await?;
    Ok(Json(json!({ "redirects": redirects })))
}

pub async fn create_redirect(
    auth: Authorized,
    State(state): State<Arc<AppState>>,
    Json(record): Json<RedirectRecord>,
) -> Accepted {
    auth.require(PERM_REDIRECT)?;
    auth.require_owner(&record.host)?;
    tracing::info!(host = %record.host, path = %record.path, subject = %auth.0.sub, "redirect created");
    state.router.insert_redirect(record).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn delete_redirect(
    auth: Authorized,
    State(state): State<Arc<AppState>>,
    Json(key): Json<RecordKey>,
) -> Accepted {
    auth.require(PERM_REDIRECT)?;
    auth.require_owner(&key.host)?;
    state.router.delete_redirect(&key.host, &key.path).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn check_challenge_domain(
    auth: &Authorized,
    state: &AppState,
    domain: &str,
) -> Result<(), ApiError> {
    auth.require(PERM_ACME_CHALLENGE)?;
    if state.domains.is_valid(domain).await {
        Ok(())
    } else {
        Err(ApiError::BadRequest("invalid ACME challenge domain".into()))
    }
}

pub async fn put_acme_challenge(
    auth: Authorized,
    State(state): State<Arc<AppState>>,
    Path((domain, key, value)): Path<(String, String, String)>,
) -> Accepted {
    check_challenge_domain(&auth, &state, &domain).await?;
    state.acme.put(&domain, &key, &value).await;
    Ok(StatusCode::ACCEPTED)
}

pub async fn delete_acme_challenge(
    auth: Authorized,
    State(state): State<Arc<AppState>>,
    Path((domain, key)): Path<(String, String)>,
) -> Accepted {
    check_challenge_domain(&auth, &state, &domain).await?;
    state.acme.delete(&domain, &key).await;
    Ok(StatusCode::ACCEPTED)
}
