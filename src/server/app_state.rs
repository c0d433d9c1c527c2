use std::sync::Arc;

use tracing::info;

use crate::{
    common::types::UserId,
    configs::Config,
    gateway::LocalVoiceClient,
    monitoring::StatsCollector,
    player::{AudioEngine, LocalAudioEngine},
    server::SessionRegistry,
    session::{OwningRegistry, Session, SessionDeps, SessionIdentity},
    transport::Transport,
};

/// Top-level application state.
pub struct AppState {
    pub config: Config,
    pub sessions: Arc<SessionRegistry>,
    pub audio: Arc<dyn AudioEngine>,
    pub stats: Arc<StatsCollector>,
}

impl AppState {
    pub fn new(config: Config) -> Arc<Self> {
        Self::with_engine(config, Arc::new(LocalAudioEngine::new()))
    }

    pub fn with_engine(config: Config, audio: Arc<dyn AudioEngine>) -> Arc<Self> {
        Arc::new(Self {
            config,
            sessions: SessionRegistry::new(),
            audio,
            stats: Arc::new(StatsCollector::new()),
        })
    }

    /// Creates a session bound to `transport` under a fresh id, indexes it
    /// and starts its background pushes.
    pub fn open_session(
        &self,
        user_id: UserId,
        client_name: Option<String>,
        transport: Arc<dyn Transport>,
    ) -> Arc<Session> {
        let owner: Arc<dyn OwningRegistry> = self.sessions.clone();
        let session = Session::new(
            SessionIdentity {
                session_id: self.sessions.next_id(),
                user_id,
                client_name,
                resume_key: None,
                resume_timeout_secs: None,
            },
            self.config.session.clone(),
            Some(transport),
            SessionDeps {
                audio: self.audio.clone(),
                voice: Arc::new(LocalVoiceClient::new(user_id)),
                owner: Arc::downgrade(&owner),
                observers: Vec::new(),
            },
        );
        self.sessions.insert(session.clone());
        session.start_background(self.stats.clone());

        info!(
            "Session opened: session={} user={} client={}",
            session.session_id(),
            user_id,
            session.client_name().unwrap_or("unknown")
        );
        session
    }
}
