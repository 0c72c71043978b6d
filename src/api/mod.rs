//! Administrative HTTP API.
//!
//! Every endpoint except `/health` requires a bearer token verified by
//! [`TokenVerifier`](crate::auth::TokenVerifier). Errors are returned as
//! `{"error": "<message>"}` JSON bodies.

mod handlers;

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::auth::Claims;
use crate::error::GatehouseError;
use crate::server::AppState;

pub use handlers::{
    compile, create_redirect, create_route, delete_acme_challenge, delete_domain,
    delete_redirect, delete_route, list_redirects, list_routes, put_acme_challenge, put_domain,
};

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    Forbidden(String),
    BadRequest(String),
    Internal(GatehouseError),
}

impl From<GatehouseError> for ApiError {
    fn from(e: GatehouseError) -> Self {
        match e {
            GatehouseError::InvalidRecord { .. } | GatehouseError::Routing(_) => {
                Self::BadRequest(e.to_string())
            }
            other => Self::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "missing or invalid token".to_string()),
            Self::Forbidden(message) => (StatusCode::FORBIDDEN, message),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Internal(e) => {
                tracing::error!(error = %e, "admin request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Verified token claims for the current request.
#[derive(Debug, Clone)]
pub struct Authorized(pub Claims);

impl Authorized {
    /// Require an endpoint permission.
    pub fn require(&self, perm: &str) -> Result<(), ApiError> {
        if self.0.has(perm) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!("missing permission '{perm}'")))
        }
    }

    /// Require ownership of the domain `host` belongs to.
    pub fn require_owner(&self, host: &str) -> Result<(), ApiError> {
        if self.0.owns(host) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!("token does not own '{host}'")))
        }
    }
}

impl FromRequestParts<Arc<AppState>> for Authorized {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        state.verifier.verify(token.trim()).map(Self).map_err(|e| {
            tracing::debug!(error = %e, "rejected admin token");
            ApiError::Unauthorized
        })
    }
}
