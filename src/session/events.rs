use std::sync::Arc;

use tracing::warn;

use crate::{common::types::AnyResult, player::Player, session::Session};

/// External component told about session and player lifecycle changes.
/// Observers have no say over the transitions; an `Err` is logged and the
/// remaining observers still run.
pub trait LifecycleObserver: Send + Sync {
    fn on_new_player(&self, _session: &Session, _player: &Arc<dyn Player>) -> AnyResult<()> {
        Ok(())
    }

    fn on_destroy_player(&self, _session: &Session, _player: &Arc<dyn Player>) -> AnyResult<()> {
        Ok(())
    }

    fn on_session_paused(&self, _session: &Session) -> AnyResult<()> {
        Ok(())
    }

    fn on_session_resumed(&self, _session: &Session) -> AnyResult<()> {
        Ok(())
    }

    fn on_session_destroyed(&self, _session: &Session) -> AnyResult<()> {
        Ok(())
    }

    fn on_message_out(&self, _session: &Session, _payload: &str) -> AnyResult<()> {
        Ok(())
    }
}

/// Synchronous fan-out to the observers registered at session creation,
/// in registration order, on the caller's task.
pub struct EventEmitter {
    observers: Vec<Arc<dyn LifecycleObserver>>,
}

impl EventEmitter {
    pub fn new(observers: Vec<Arc<dyn LifecycleObserver>>) -> Self {
        Self { observers }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    fn dispatch<F>(&self, session: &Session, hook: &str, f: F)
    where
        F: Fn(&dyn LifecycleObserver) -> AnyResult<()>,
    {
        for (index, observer) in self.observers.iter().enumerate() {
            if let Err(e) = f(observer.as_ref()) {
                warn!(
                    "Lifecycle observer #{} failed in {}: session={} err={}",
                    index,
                    hook,
                    session.session_id(),
                    e
                );
            }
        }
    }

    pub fn new_player(&self, session: &Session, player: &Arc<dyn Player>) {
        self.dispatch(session, "on_new_player", |o| o.on_new_player(session, player));
    }

    pub fn destroy_player(&self, session: &Session, player: &Arc<dyn Player>) {
        self.dispatch(session, "on_destroy_player", |o| {
            o.on_destroy_player(session, player)
        });
    }

    pub fn session_paused(&self, session: &Session) {
        self.dispatch(session, "on_session_paused", |o| o.on_session_paused(session));
    }

    pub fn session_resumed(&self, session: &Session) {
        self.dispatch(session, "on_session_resumed", |o| o.on_session_resumed(session));
    }

    pub fn session_destroyed(&self, session: &Session) {
        self.dispatch(session, "on_session_destroyed", |o| {
            o.on_session_destroyed(session)
        });
    }

    pub fn message_out(&self, session: &Session, payload: &str) {
        self.dispatch(session, "on_message_out", |o| o.on_message_out(session, payload));
    }
}
