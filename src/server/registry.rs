use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};

use crate::{
    common::{errors::ResumeError, types::SessionId},
    session::{OwningRegistry, Session, SessionState},
    transport::Transport,
};

/// Process-wide index of live and paused sessions, keyed by session id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A session id not currently in use.
    pub fn next_id(&self) -> SessionId {
        loop {
            let id = SessionId::generate();
            if !self.sessions.contains_key(&id) {
                return id;
            }
        }
    }

    /// Indexes `session`. A different session already stored under the same
    /// id is destroyed.
    pub fn insert(&self, session: Arc<Session>) {
        let id = session.session_id().clone();
        if let Some(previous) = self.sessions.insert(id.clone(), session.clone()) {
            if !Arc::ptr_eq(&previous, &session) {
                warn!(
                    "Shutting down session {} because a new session took its id",
                    id
                );
                previous.destroy();
            }
        }
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|s| s.value().clone())
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.remove(session_id).map(|(_, s)| s)
    }

    /// Drops `session` from the index, but only if it is still the one
    /// stored under its id.
    pub fn remove_session(&self, session: &Arc<Session>) -> bool {
        self.sessions
            .remove_if(session.session_id(), |_, stored| Arc::ptr_eq(stored, session))
            .is_some()
    }

    /// Whether `resume` would currently find a paused session to rebind.
    pub fn can_resume(&self, session_id: &str, resume_key: Option<&str>) -> bool {
        self.get(session_id).is_some_and(|s| {
            s.state() == SessionState::Resumable
                && s.resume_key().is_some_and(|key| Some(key.as_str()) == resume_key)
        })
    }

    /// Rebinds the paused session `session_id` to `transport`.
    pub fn resume(
        &self,
        session_id: &str,
        transport: Arc<dyn Transport>,
        resume_key: Option<&str>,
    ) -> Result<Arc<Session>, ResumeError> {
        let session = self
            .get(session_id)
            .ok_or_else(|| ResumeError::UnknownSession(SessionId::from(session_id)))?;
        session.resume(transport, resume_key)?;
        Ok(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Destroys and forgets every session. Returns how many were dropped.
    pub fn shutdown_all(&self) -> usize {
        let sessions: Vec<Arc<Session>> = self.sessions.iter().map(|s| s.value().clone()).collect();
        self.sessions.clear();
        for session in &sessions {
            session.destroy();
        }
        sessions.len()
    }
}

impl OwningRegistry for SessionRegistry {
    fn on_resume_timeout(&self, session_id: &SessionId) {
        let removed = self
            .sessions
            .remove_if(session_id, |_, s| s.state() == SessionState::Destroyed);
        if removed.is_some() {
            info!("Dropped expired session: {}", session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Weak, time::Duration};

    use super::*;
    use crate::{
        common::types::UserId,
        configs::SessionConfig,
        gateway::LocalVoiceClient,
        player::LocalAudioEngine,
        session::{SessionDeps, SessionIdentity},
        transport::WebSocketTransport,
    };

    fn open(registry: &Arc<SessionRegistry>, id: &str, timeout_secs: u64) -> Arc<Session> {
        let owner: Arc<dyn OwningRegistry> = registry.clone();
        let (tx, _rx) = flume::unbounded();
        let session = Session::new(
            SessionIdentity {
                session_id: SessionId::from(id),
                user_id: UserId(1),
                client_name: None,
                resume_key: None,
                resume_timeout_secs: None,
            },
            SessionConfig {
                resume_timeout_secs: timeout_secs,
                ..SessionConfig::default()
            },
            Some(Arc::new(WebSocketTransport::new(tx))),
            SessionDeps {
                audio: Arc::new(LocalAudioEngine::new()),
                voice: Arc::new(LocalVoiceClient::new(UserId(1))),
                owner: Arc::downgrade(&owner),
                observers: Vec::new(),
            },
        );
        registry.insert(session.clone());
        session
    }

    fn fresh_transport() -> (Arc<dyn Transport>, flume::Receiver<axum::extract::ws::Message>) {
        let (tx, rx) = flume::unbounded();
        let transport: Arc<dyn Transport> = Arc::new(WebSocketTransport::new(tx));
        (transport, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_session_leaves_the_index() {
        let registry = SessionRegistry::new();
        let session = open(&registry, "abc", 10);
        session.configure_resuming(Some("k".into()), None).unwrap();
        session.pause();

        tokio::time::sleep(Duration::from_secs(11)).await;

        assert!(registry.get("abc").is_none());
        let (transport, _rx) = fresh_transport();
        let Err(err) = registry.resume("abc", transport, Some("k")) else {
            panic!("expired session must not resume");
        };
        assert_eq!(err, ResumeError::UnknownSession(SessionId::from("abc")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_rebinds_paused_session() {
        let registry = SessionRegistry::new();
        let session = open(&registry, "abc", 60);
        session.configure_resuming(Some("k".into()), None).unwrap();
        session.pause();
        session.deliver("queued".into());

        assert!(registry.can_resume("abc", Some("k")));
        assert!(!registry.can_resume("abc", Some("nope")));
        assert!(!registry.can_resume("abc", None));

        let (transport, rx) = fresh_transport();
        let resumed = registry.resume("abc", transport, Some("k")).unwrap();

        assert!(Arc::ptr_eq(&resumed, &session));
        assert_eq!(rx.try_iter().count(), 1);
        assert!(!registry.can_resume("abc", Some("k")));
    }

    #[test]
    fn test_insert_replaces_and_destroys_previous_holder() {
        let registry = SessionRegistry::new();
        let first = open(&registry, "dup", 60);
        let second = open(&registry, "dup", 60);

        assert_eq!(first.state(), SessionState::Destroyed);
        assert_eq!(second.state(), SessionState::Open);
        assert!(Arc::ptr_eq(&registry.get("dup").unwrap(), &second));

        // A stale handle cannot evict its replacement
        assert!(!registry.remove_session(&first));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_shutdown_all_destroys_everything() {
        let registry = SessionRegistry::new();
        let a = open(&registry, "a", 60);
        let b = open(&registry, "b", 60);

        assert_eq!(registry.shutdown_all(), 2);
        assert!(registry.is_empty());
        assert_eq!(a.state(), SessionState::Destroyed);
        assert_eq!(b.state(), SessionState::Destroyed);
    }

    #[test]
    fn test_timeout_for_live_session_keeps_it() {
        let registry = SessionRegistry::new();
        open(&registry, "live", 60);

        registry.on_resume_timeout(&SessionId::from("live"));
        assert!(registry.get("live").is_some());
    }

    #[test]
    fn test_sessions_do_not_keep_registry_alive() {
        let registry = SessionRegistry::new();
        let session = open(&registry, "x", 60);
        let weak: Weak<SessionRegistry> = Arc::downgrade(&registry);
        drop(registry);

        assert!(weak.upgrade().is_none());
        assert!(session.destroy());
    }

    #[test]
    fn test_next_id_is_unused() {
        let registry = SessionRegistry::new();
        open(&registry, "taken", 60);
        let id = registry.next_id();
        assert_eq!(id.len(), 16);
        assert!(registry.get(&id).is_none());
    }
}
