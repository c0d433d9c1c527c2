use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tracing::{debug, info};

use crate::{
    common::errors::RelayError,
    protocol::{PlayerSummary, SessionInfo, SessionUpdate},
    server::AppState,
    session::Session,
};

fn session_not_found(session_id: &str, path: String) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(RelayError::not_found(
            format!("Session not found: {}", session_id),
            path,
        )),
    )
        .into_response()
}

/// Resume key after applying `update`. `resuming: false` always clears
/// the key; `resuming: true` without a key falls back to the session id.
pub fn next_resume_key(
    current: Option<String>,
    update: &SessionUpdate,
    session_id: &str,
) -> Option<String> {
    match (update.resuming, update.resume_key.as_ref()) {
        (Some(false), _) => None,
        (_, Some(key)) => Some(key.clone()),
        (Some(true), None) => current.or_else(|| Some(session_id.to_string())),
        (None, None) => current,
    }
}

fn session_info(session: &Session) -> SessionInfo {
    SessionInfo {
        resuming: session.is_resumable(),
        resume_key: session.resume_key(),
        timeout: session.resume_timeout().as_secs(),
    }
}

/// PATCH /v4/sessions/{sessionId}
pub async fn update_session(
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<SessionUpdate>,
) -> Response {
    debug!("Update session: session={} body={:?}", session_id, body);

    let Some(session) = state.sessions.get(&session_id) else {
        return session_not_found(&session_id, format!("/v4/sessions/{}", session_id));
    };

    let key = next_resume_key(session.resume_key(), &body, &session_id);
    if let Err(e) = session.configure_resuming(key, body.timeout) {
        return (
            StatusCode::CONFLICT,
            Json(RelayError::conflict(
                e.to_string(),
                format!("/v4/sessions/{}", session_id),
            )),
        )
            .into_response();
    }

    (StatusCode::OK, Json(session_info(&session))).into_response()
}

/// GET /v4/sessions/{sessionId}/players
pub async fn get_players(
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    debug!("GET /v4/sessions/{}/players", session_id);

    let Some(session) = state.sessions.get(&session_id) else {
        return session_not_found(&session_id, format!("/v4/sessions/{}/players", session_id));
    };

    let mut players: Vec<PlayerSummary> = session
        .players()
        .into_values()
        .map(|p| PlayerSummary {
            guild_id: p.guild_id().clone(),
            playing: p.is_playing(),
            state: p.state(),
        })
        .collect();
    players.sort_by(|a, b| a.guild_id.cmp(&b.guild_id));

    (StatusCode::OK, Json(players)).into_response()
}

/// DELETE /v4/sessions/{sessionId}
pub async fn delete_session(
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(session) = state.sessions.remove(&session_id) else {
        return session_not_found(&session_id, format!("/v4/sessions/{}", session_id));
    };

    info!("Session deleted over REST: {}", session_id);
    session.destroy();
    StatusCode::NO_CONTENT.into_response()
}
