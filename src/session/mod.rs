//! Session supervisor.
//!
//! A [`Session`] owns one client's logical connection: the bound transport
//! and its replay buffer, the per-guild players and media connections, the
//! resume deadline and the background pushes. Every state transition goes
//! through the lifecycle lock; teardown is additionally serialized so a
//! second `destroy` returns only after the first one finished.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Weak},
    time::Duration,
};

use parking_lot::{Mutex, ReentrantMutex};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    common::{
        errors::{ResumeError, SessionError},
        types::{GuildId, SessionId, UserId},
    },
    configs::SessionConfig,
    gateway::{MediaConnection, VoiceClient, VoiceEventListener},
    monitoring::StatsCollector,
    player::{AudioEngine, Player},
    protocol::{OutgoingMessage, RelayEvent},
    transport::Transport,
};

pub mod events;
pub(crate) mod outbound;
pub mod registry;
pub(crate) mod scheduler;
pub mod state;
pub mod timer;
pub mod voice;

#[cfg(test)]
mod test_support;

pub use events::{EventEmitter, LifecycleObserver};
pub use registry::PlayerRegistry;
pub use state::SessionState;
pub use timer::ResumeTimer;
pub use voice::VoiceConnections;

use self::{
    registry::Lookup,
    state::{Lifecycle, Released},
};

/// The process-wide index that owns sessions. Told once when a paused
/// session's resume window runs out.
pub trait OwningRegistry: Send + Sync {
    fn on_resume_timeout(&self, session_id: &SessionId);
}

/// What the handshake layer knows about the peer when the session is
/// established.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub client_name: Option<String>,
    /// Enables resuming from the start. `None` leaves it disabled until
    /// [`Session::configure_resuming`] sets a key.
    pub resume_key: Option<String>,
    /// Overrides `SessionConfig::resume_timeout_secs`.
    pub resume_timeout_secs: Option<u64>,
}

/// Collaborators handed to a session at construction.
pub struct SessionDeps {
    pub audio: Arc<dyn AudioEngine>,
    /// Per-session voice client; closed by teardown.
    pub voice: Arc<dyn VoiceClient>,
    pub owner: Weak<dyn OwningRegistry>,
    pub observers: Vec<Arc<dyn LifecycleObserver>>,
}

pub struct Session {
    session_id: SessionId,
    user_id: UserId,
    client_name: Option<String>,
    config: SessionConfig,
    lifecycle: Mutex<Lifecycle>,
    teardown: ReentrantMutex<()>,
    players: PlayerRegistry,
    voice: VoiceConnections,
    audio: Arc<dyn AudioEngine>,
    emitter: EventEmitter,
    owner: Weak<dyn OwningRegistry>,
    background: CancellationToken,
    /// Runtime the resume deadline and background tasks are spawned on,
    /// captured at construction so pause works from any thread.
    runtime: Option<Handle>,
    this: Weak<Session>,
}

enum PauseOutcome {
    Paused(Duration),
    NotResumable,
    NoRuntime,
}

impl Session {
    pub fn new(
        identity: SessionIdentity,
        config: SessionConfig,
        transport: Option<Arc<dyn Transport>>,
        deps: SessionDeps,
    ) -> Arc<Self> {
        let resume_timeout = Duration::from_secs(
            identity
                .resume_timeout_secs
                .unwrap_or(config.resume_timeout_secs),
        );
        let lifecycle = Lifecycle::new(transport, identity.resume_key, resume_timeout);
        Arc::new_cyclic(|this| Self {
            session_id: identity.session_id,
            user_id: identity.user_id,
            client_name: identity.client_name,
            config,
            lifecycle: Mutex::new(lifecycle),
            teardown: ReentrantMutex::new(()),
            players: PlayerRegistry::new(),
            voice: VoiceConnections::new(deps.voice),
            audio: deps.audio,
            emitter: EventEmitter::new(deps.observers),
            owner: deps.owner,
            background: CancellationToken::new(),
            runtime: Handle::try_current().ok(),
            this: this.clone(),
        })
    }

    /// Spawns the stats and player-update tasks. Both stop when the session
    /// is torn down; teardown does not wait for a tick already running.
    pub fn start_background(&self, stats: Arc<StatsCollector>) {
        if self.state() == SessionState::Destroyed {
            return;
        }
        let Some(runtime) = self.runtime.as_ref() else {
            warn!(
                "No tokio runtime, background pushes disabled: session={}",
                self.session_id
            );
            return;
        };
        scheduler::spawn_stats_task(
            runtime,
            self.this.clone(),
            stats,
            self.config.stats_interval(),
            self.background.child_token(),
        );
        scheduler::spawn_player_update_task(
            runtime,
            self.this.clone(),
            self.config.player_update_interval(),
            self.background.child_token(),
        );
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn client_name(&self) -> Option<&str> {
        self.client_name.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.lock().state
    }

    // -- Resume configuration ---------------------------------------------

    /// Sets or clears the resume key and optionally overrides the grace
    /// window. Takes effect on the next pause. Refused while paused, so the
    /// credentials a pause episode was started with stay fixed until it ends.
    pub fn configure_resuming(
        &self,
        resume_key: Option<String>,
        timeout_secs: Option<u64>,
    ) -> Result<(), SessionError> {
        let mut lifecycle = self.lifecycle.lock();
        match lifecycle.state {
            SessionState::Open => {}
            SessionState::Resumable => {
                return Err(SessionError::Paused(self.session_id.clone()));
            }
            SessionState::Destroyed => {
                return Err(SessionError::Destroyed(self.session_id.clone()));
            }
        }
        lifecycle.resume_key = resume_key;
        if let Some(secs) = timeout_secs {
            lifecycle.resume_timeout = Duration::from_secs(secs);
        }
        debug!(
            "Resuming configured: session={} enabled={} timeout={:?}",
            self.session_id,
            lifecycle.resume_key.is_some(),
            lifecycle.resume_timeout
        );
        Ok(())
    }

    pub fn resume_key(&self) -> Option<String> {
        self.lifecycle.lock().resume_key.clone()
    }

    pub fn resume_timeout(&self) -> Duration {
        self.lifecycle.lock().resume_timeout
    }

    pub fn is_resumable(&self) -> bool {
        self.lifecycle.lock().resume_key.is_some()
    }

    /// Number of payloads waiting for a resume.
    pub fn queued_messages(&self) -> usize {
        self.lifecycle.lock().outbound.queued()
    }

    // -- Outbound delivery --------------------------------------------------

    /// Sends `payload` now, buffers it while paused, or drops it when no
    /// live transport is bound. Never fails.
    pub fn deliver(&self, payload: String) {
        self.emitter.message_out(self, &payload);

        let mut lifecycle = self.lifecycle.lock();
        match lifecycle.state {
            SessionState::Resumable => lifecycle.outbound.enqueue(payload),
            SessionState::Open | SessionState::Destroyed => {
                lifecycle.outbound.send(&self.session_id, payload)
            }
        }
    }

    pub fn send_message(&self, message: &OutgoingMessage) {
        match serde_json::to_string(message) {
            Ok(json) => self.deliver(json),
            Err(e) => error!("Failed to serialize message: session={} err={}", self.session_id, e),
        }
    }

    /// Pushes the player's current state. Skipped while the session is not
    /// open; resume pushes a fresh snapshot anyway.
    pub fn send_player_update(&self, player: &Arc<dyn Player>) {
        if self.state() != SessionState::Open {
            return;
        }
        self.send_message(&OutgoingMessage::PlayerUpdate {
            guild_id: player.guild_id().clone(),
            state: player.state(),
        });
    }

    pub fn close_transport(&self, code: u16, reason: Option<String>) {
        let lifecycle = self.lifecycle.lock();
        if let Some(transport) = lifecycle.outbound.transport() {
            transport.close(code, reason);
        }
    }

    // -- Lifecycle ----------------------------------------------------------

    /// The bound transport is gone. Starts the resume window, or destroys
    /// the session outright when resuming is disabled. Returns the
    /// resulting state.
    pub fn pause(&self) -> SessionState {
        self.pause_inner(None)
    }

    /// Like [`Session::pause`], but only if `transport` is still the bound
    /// one; a socket that was already replaced by a resume is ignored.
    pub fn transport_lost(&self, transport: &Arc<dyn Transport>) -> SessionState {
        self.pause_inner(Some(transport))
    }

    fn pause_inner(&self, expected: Option<&Arc<dyn Transport>>) -> SessionState {
        let outcome = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state != SessionState::Open {
                return lifecycle.state;
            }
            if let Some(transport) = expected {
                if !lifecycle.outbound.is_bound_to(transport) {
                    debug!(
                        "Stale transport closed, session already rebound: session={}",
                        self.session_id
                    );
                    return lifecycle.state;
                }
            }

            if lifecycle.resume_key.is_none() {
                PauseOutcome::NotResumable
            } else if let Some(runtime) = self.runtime.as_ref() {
                lifecycle.state = SessionState::Resumable;
                lifecycle.outbound.detach();
                lifecycle.pause_epoch += 1;

                let epoch = lifecycle.pause_epoch;
                let timeout = lifecycle.resume_timeout;
                let this = self.this.clone();
                lifecycle.resume_timer = Some(ResumeTimer::start(runtime, timeout, move || {
                    if let Some(session) = this.upgrade() {
                        session.expire(epoch);
                    }
                }));
                PauseOutcome::Paused(timeout)
            } else {
                PauseOutcome::NoRuntime
            }
        };

        match outcome {
            PauseOutcome::Paused(timeout) => {
                info!(
                    "Connection closed (resumable). Session {} can be resumed within {} seconds.",
                    self.session_id,
                    timeout.as_secs()
                );
                self.emitter.session_paused(self);
                SessionState::Resumable
            }
            PauseOutcome::NotResumable => {
                info!("Connection closed (not resumable): {}", self.session_id);
                self.destroy();
                SessionState::Destroyed
            }
            PauseOutcome::NoRuntime => {
                error!(
                    "No tokio runtime to run the resume deadline, destroying session {}",
                    self.session_id
                );
                self.destroy();
                SessionState::Destroyed
            }
        }
    }

    /// Rebinds a paused session to `transport`. Buffered payloads are
    /// written first, in order, before anything produced afterwards; then
    /// every playing player gets a fresh `playerUpdate`.
    pub fn resume(
        &self,
        transport: Arc<dyn Transport>,
        resume_key: Option<&str>,
    ) -> Result<(), ResumeError> {
        let replayed = {
            let mut lifecycle = self.lifecycle.lock();
            match lifecycle.state {
                SessionState::Destroyed => {
                    return Err(ResumeError::Destroyed(self.session_id.clone()));
                }
                SessionState::Open => {
                    return Err(ResumeError::NotPaused(self.session_id.clone()));
                }
                SessionState::Resumable => {}
            }
            match lifecycle.resume_key.as_deref() {
                Some(key) if Some(key) == resume_key => {}
                _ => return Err(ResumeError::KeyMismatch(self.session_id.clone())),
            }

            if let Some(timer) = lifecycle.resume_timer.take() {
                timer.cancel();
            }
            lifecycle.state = SessionState::Open;
            lifecycle.outbound.attach_and_replay(&self.session_id, transport)
        };

        info!("Resumed session {}, replayed {} events", self.session_id, replayed);
        self.emitter.session_resumed(self);

        for player in self.playing_players() {
            self.send_player_update(&player);
        }
        Ok(())
    }

    /// Resume deadline for pause episode `epoch` ran out.
    fn expire(&self, epoch: u64) {
        let _teardown = self.teardown.lock();
        let released = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state != SessionState::Resumable || lifecycle.pause_epoch != epoch {
                return;
            }
            lifecycle.release()
        };
        let Some(released) = released else { return };

        info!("Session resume timeout expired: {}", self.session_id);
        self.finish_teardown(released);

        if let Some(owner) = self.owner.upgrade() {
            owner.on_resume_timeout(&self.session_id);
        }
    }

    /// Tears the session down. Safe from any thread, any number of times;
    /// returns `true` only for the call that did the work.
    pub fn destroy(&self) -> bool {
        let _teardown = self.teardown.lock();
        let released = self.lifecycle.lock().release();
        let Some(released) = released else {
            return false;
        };

        info!("Destroying session: {}", self.session_id);
        self.finish_teardown(released);
        true
    }

    fn finish_teardown(&self, released: Released) {
        self.background.cancel();
        if let Some(timer) = released.resume_timer {
            timer.cancel();
        }
        if released.dropped > 0 {
            debug!(
                "Dropped {} buffered payloads: session={}",
                released.dropped, self.session_id
            );
        }

        info!(
            "Shutting down {} playing players: session={}",
            self.players.playing().len(),
            self.session_id
        );
        self.players.close();
        for guild_id in self.players.guild_ids() {
            self.destroy_player(&guild_id);
        }
        self.voice.close();

        if let Some(transport) = released.transport {
            if transport.is_open() {
                transport.close(1000, Some("Session destroyed".into()));
            }
        }

        self.emitter.session_destroyed(self);
    }

    // -- Players and voice --------------------------------------------------

    /// Returns the guild's player, creating it on first access.
    pub fn get_player(&self, guild_id: &GuildId) -> Result<Arc<dyn Player>, SessionError> {
        if self.state() == SessionState::Destroyed {
            return Err(SessionError::Destroyed(self.session_id.clone()));
        }

        let lookup = self.players.get_or_create(guild_id, || {
            self.audio.create_player(&self.session_id, guild_id)
        });
        match lookup {
            Lookup::Existing(player) => Ok(player),
            Lookup::Created(player) => {
                debug!("[{}] Player created: session={}", guild_id, self.session_id);
                self.emitter.new_player(self, &player);
                Ok(player)
            }
            Lookup::Closed => Err(SessionError::Destroyed(self.session_id.clone())),
        }
    }

    pub fn player(&self, guild_id: &GuildId) -> Option<Arc<dyn Player>> {
        self.players.get(guild_id)
    }

    pub fn players(&self) -> HashMap<GuildId, Arc<dyn Player>> {
        self.players.snapshot()
    }

    pub fn playing_players(&self) -> Vec<Arc<dyn Player>> {
        self.players.playing()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Removes the guild's player if any, then always releases the guild's
    /// media connection. Collaborator failures are logged; the bookkeeping
    /// entry is gone either way.
    pub fn destroy_player(&self, guild_id: &GuildId) {
        if let Some(player) = self.players.remove(guild_id) {
            self.emitter.destroy_player(self, &player);
            if let Err(e) = player.destroy() {
                warn!(
                    "[{}] Player teardown failed: session={} err={}",
                    guild_id, self.session_id, e
                );
            }
        }
        self.voice.destroy(guild_id);
    }

    /// Returns the guild's media connection, creating it with a listener
    /// that reports gateway events back into this session.
    pub fn media_connection(
        &self,
        guild_id: &GuildId,
    ) -> Result<Arc<dyn MediaConnection>, SessionError> {
        let this = self.this.clone();
        let guild = guild_id.clone();
        self.voice
            .get_or_create(guild_id, move || {
                Arc::new(SessionVoiceListener {
                    session: this,
                    guild_id: guild,
                }) as Arc<dyn VoiceEventListener>
            })
            .ok_or_else(|| SessionError::Destroyed(self.session_id.clone()))
    }

    fn on_voice_closed(&self, guild_id: &GuildId, code: u16, reason: Option<String>, by_remote: bool) {
        debug!(
            "[{}] Voice gateway closed: code={} by_remote={}",
            guild_id, code, by_remote
        );
        self.send_message(&OutgoingMessage::Event {
            event: RelayEvent::WebSocketClosed {
                guild_id: guild_id.clone(),
                code,
                reason: reason.unwrap_or_default(),
                by_remote,
            },
        });
        if let Some(player) = self.players.get(guild_id) {
            self.send_player_update(&player);
        }
    }

    fn on_voice_ready(&self, guild_id: &GuildId, target: SocketAddr, ssrc: u32) {
        debug!("[{}] Voice gateway ready: target={} ssrc={}", guild_id, target, ssrc);
        if let Some(player) = self.players.get(guild_id) {
            self.send_player_update(&player);
        }
    }
}

/// Listener bound to one media connection. Holds the session weakly; the
/// connection is owned by the session's voice client.
struct SessionVoiceListener {
    session: Weak<Session>,
    guild_id: GuildId,
}

impl VoiceEventListener for SessionVoiceListener {
    fn gateway_closed(&self, code: u16, reason: Option<String>, by_remote: bool) {
        if let Some(session) = self.session.upgrade() {
            session.on_voice_closed(&self.guild_id, code, reason, by_remote);
        }
    }

    fn gateway_ready(&self, target: SocketAddr, ssrc: u32) {
        if let Some(session) = self.session.upgrade() {
            session.on_voice_ready(&self.guild_id, target, ssrc);
        }
    }
}
