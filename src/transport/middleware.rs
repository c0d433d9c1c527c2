use std::sync::Arc;

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::{common::errors::RelayError, server::AppState};

/// Whether `header` carries the configured password.
pub fn authorized(state: &AppState, header: Option<&str>) -> bool {
    header.is_some_and(|auth| auth == state.config.server.password)
}

pub async fn check_auth(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok());

    if authorized(&state, auth_header) {
        return next.run(req).await;
    }

    if auth_header.is_some() {
        warn!("REST Authorization failed: Invalid password");
    } else {
        warn!("REST Authorization failed: Missing Authorization header");
    }
    let path = req.uri().path().to_string();
    (StatusCode::UNAUTHORIZED, Json(RelayError::unauthorized(path))).into_response()
}

pub async fn add_response_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert("Relaylink-Api-Version", HeaderValue::from_static("4"));
    response
}
