use std::{num::NonZeroU64, sync::Arc};

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use crate::{
    common::types::UserId,
    protocol::OutgoingMessage,
    server::AppState,
    session::{Session, SessionState},
    transport::{Transport, WebSocketTransport, middleware::authorized},
};

/// Handshake headers of `GET /v4/websocket`.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub user_id: UserId,
    pub client_name: Option<String>,
    pub session_id: Option<String>,
    pub resume_key: Option<String>,
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(String::from)
}

impl Handshake {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, (StatusCode, &'static str)> {
        let user_id = headers
            .get("user-id")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .and_then(NonZeroU64::new)
            .map(|id| UserId(id.get()))
            .ok_or((StatusCode::BAD_REQUEST, "Missing or invalid User-Id header"))?;

        Ok(Self {
            user_id,
            client_name: header(headers, "client-name"),
            session_id: header(headers, "session-id"),
            resume_key: header(headers, "resume-key"),
        })
    }
}

pub async fn websocket_handler(
    headers: HeaderMap,
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Result<Response, (StatusCode, &'static str)> {
    let auth_header = headers.get("authorization").and_then(|h| h.to_str().ok());
    if !authorized(&state, auth_header) {
        if auth_header.is_some() {
            warn!("Authorization failed: Invalid password provided");
        } else {
            warn!("Authorization failed: Missing Authorization header");
        }
        return Err((StatusCode::UNAUTHORIZED, "Unauthorized"));
    }

    let handshake = Handshake::from_headers(&headers)?;
    match handshake.client_name.as_deref() {
        Some(name) => info!("Incoming connection from client: {}", name),
        None => warn!("Client connected without 'Client-Name' header"),
    }

    let resuming = handshake
        .session_id
        .as_deref()
        .is_some_and(|id| state.sessions.can_resume(id, handshake.resume_key.as_deref()));

    let mut response = ws
        .on_upgrade(move |socket| handle_socket(socket, state, handshake))
        .into_response();
    response.headers_mut().insert(
        "Session-Resumed",
        HeaderValue::from_static(if resuming { "true" } else { "false" }),
    );
    Ok(response)
}

/// Binds `transport` to the session named in the handshake, or to a new
/// one. Returns the session and whether it was resumed.
fn bind_session(
    state: &AppState,
    handshake: &Handshake,
    transport: Arc<dyn Transport>,
) -> (Arc<Session>, bool) {
    if let Some(sid) = handshake.session_id.as_deref() {
        match state
            .sessions
            .resume(sid, transport.clone(), handshake.resume_key.as_deref())
        {
            Ok(session) => return (session, true),
            Err(e) => info!("Resume refused, starting a new session: {}", e),
        }
    }
    let session = state.open_session(handshake.user_id, handshake.client_name.clone(), transport);
    (session, false)
}

pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>, handshake: Handshake) {
    let (tx, rx) = flume::unbounded();
    let transport = Arc::new(WebSocketTransport::new(tx));
    let bound: Arc<dyn Transport> = transport.clone();

    let (session, resumed) = bind_session(&state, &handshake, bound.clone());
    let session_id = session.session_id().clone();
    info!("WebSocket connected: session={} resumed={}", session_id, resumed);

    let (mut sink, mut stream) = socket.split();

    // Ready goes out ahead of anything already queued on the channel,
    // including a resume replay.
    let ready = OutgoingMessage::Ready {
        resumed,
        session_id: session_id.clone(),
    };
    match serde_json::to_string(&ready) {
        Ok(json) => {
            if let Err(e) = sink.send(Message::Text(json.into())).await {
                error!("Socket send error (ready): session={} err={}", session_id, e);
            }
        }
        Err(e) => error!("Failed to serialize ready: session={} err={}", session_id, e),
    }

    loop {
        tokio::select! {
            msg = rx.recv_async() => {
                let Ok(msg) = msg else { break };
                let closing = matches!(msg, Message::Close(_));
                if let Err(e) = sink.send(msg).await {
                    error!("Socket send error: session={} err={}", session_id, e);
                    break;
                }
                if closing {
                    debug!("Close frame sent: session={}", session_id);
                    break;
                }
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(_))) => {
                        warn!("Inbound websocket messages are not supported, use the REST api");
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error: session={} err={}", session_id, e);
                        break;
                    }
                }
            }
        }
    }

    transport.mark_closed();
    if session.transport_lost(&bound) == SessionState::Destroyed
        && state.sessions.remove_session(&session)
    {
        debug!("Session removed from registry: {}", session_id);
    }
}
