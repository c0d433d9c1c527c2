use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, patch},
};

use crate::{
    server::AppState,
    transport::{
        middleware::{add_response_headers, check_auth},
        routes::sessions,
    },
};

const API_V4: &str = "/v4";

/// REST surface. The websocket route authenticates in its own handler so it
/// can answer the handshake with plain status codes.
pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let v4_routes = Router::new()
        .route(
            "/sessions/{session_id}",
            patch(sessions::update_session).delete(sessions::delete_session),
        )
        .route("/sessions/{session_id}/players", get(sessions::get_players));

    Router::new()
        .nest(API_V4, v4_routes)
        .layer(middleware::from_fn_with_state(state, check_auth))
        .layer(middleware::from_fn(add_response_headers))
}
