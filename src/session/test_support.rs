use std::sync::{
    Arc, Weak,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use parking_lot::Mutex;

use crate::{
    common::{
        errors::TransportError,
        types::{AnyResult, GuildId, SessionId, UserId},
    },
    configs::SessionConfig,
    gateway::{LocalVoiceClient, MediaConnection, VoiceClient},
    player::{AudioEngine, LocalPlayer, Player},
    protocol::PlayerState,
    session::{LifecycleObserver, OwningRegistry, Session, SessionDeps, SessionIdentity},
    transport::Transport,
};

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<String>>,
    closed: AtomicBool,
    fail_writes: AtomicBool,
    pub close_frames: Mutex<Vec<(u16, Option<String>)>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// `op` of every JSON payload sent; raw strings are reported as-is.
    pub fn ops(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|p| match serde_json::from_str::<serde_json::Value>(p) {
                Ok(v) => v["op"].as_str().unwrap_or_default().to_string(),
                Err(_) => p.clone(),
            })
            .collect()
    }

    pub fn drop_connection(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }
}

impl Transport for RecordingTransport {
    fn send(&self, payload: String) -> Result<(), TransportError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.sent.lock().push(payload);
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn close(&self, code: u16, reason: Option<String>) {
        self.closed.store(true, Ordering::SeqCst);
        self.close_frames.lock().push((code, reason));
    }
}

/// Records every lifecycle hook as a short tag, e.g. `new_player:1`.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn count(&self, tag: &str) -> usize {
        self.events.lock().iter().filter(|e| e.as_str() == tag).count()
    }

    fn push(&self, tag: String) -> AnyResult<()> {
        self.events.lock().push(tag);
        Ok(())
    }
}

impl LifecycleObserver for RecordingObserver {
    fn on_new_player(&self, _session: &Session, player: &Arc<dyn Player>) -> AnyResult<()> {
        self.push(format!("new_player:{}", player.guild_id()))
    }

    fn on_destroy_player(&self, _session: &Session, player: &Arc<dyn Player>) -> AnyResult<()> {
        self.push(format!("destroy_player:{}", player.guild_id()))
    }

    fn on_session_paused(&self, _session: &Session) -> AnyResult<()> {
        self.push("paused".into())
    }

    fn on_session_resumed(&self, _session: &Session) -> AnyResult<()> {
        self.push("resumed".into())
    }

    fn on_session_destroyed(&self, _session: &Session) -> AnyResult<()> {
        self.push("destroyed".into())
    }

    fn on_message_out(&self, _session: &Session, _payload: &str) -> AnyResult<()> {
        self.push("out".into())
    }
}

/// Fails every hook.
pub struct FailingObserver;

impl LifecycleObserver for FailingObserver {
    fn on_new_player(&self, _session: &Session, _player: &Arc<dyn Player>) -> AnyResult<()> {
        Err("observer exploded".into())
    }

    fn on_session_paused(&self, _session: &Session) -> AnyResult<()> {
        Err("observer exploded".into())
    }

    fn on_session_destroyed(&self, _session: &Session) -> AnyResult<()> {
        Err("observer exploded".into())
    }

    fn on_message_out(&self, _session: &Session, _payload: &str) -> AnyResult<()> {
        Err("observer exploded".into())
    }
}

#[derive(Default)]
pub struct RecordingOwner {
    expired: Mutex<Vec<SessionId>>,
}

impl RecordingOwner {
    pub fn expired(&self) -> Vec<SessionId> {
        self.expired.lock().clone()
    }
}

impl OwningRegistry for RecordingOwner {
    fn on_resume_timeout(&self, session_id: &SessionId) {
        self.expired.lock().push(session_id.clone());
    }
}

/// Player delegating to [`LocalPlayer`] with an optional failing destroy.
pub struct TestPlayer {
    pub inner: LocalPlayer,
    fail_destroy: bool,
    pub destroy_calls: AtomicUsize,
}

impl Player for TestPlayer {
    fn guild_id(&self) -> &GuildId {
        self.inner.guild_id()
    }

    fn is_playing(&self) -> bool {
        self.inner.is_playing()
    }

    fn state(&self) -> PlayerState {
        self.inner.state()
    }

    fn destroy(&self) -> AnyResult<()> {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.destroy()?;
        if self.fail_destroy {
            return Err("player release failed".into());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct TestEngine {
    created: Mutex<Vec<Arc<TestPlayer>>>,
    fail_destroy: AtomicBool,
}

impl TestEngine {
    pub fn created(&self) -> Vec<Arc<TestPlayer>> {
        self.created.lock().clone()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }

    pub fn fail_destroy(&self) {
        self.fail_destroy.store(true, Ordering::SeqCst);
    }

    pub fn typed(&self, guild_id: &GuildId) -> Option<Arc<TestPlayer>> {
        self.created
            .lock()
            .iter()
            .find(|p| p.guild_id() == guild_id)
            .cloned()
    }
}

impl AudioEngine for TestEngine {
    fn create_player(&self, _session_id: &SessionId, guild_id: &GuildId) -> Arc<dyn Player> {
        let player = Arc::new(TestPlayer {
            inner: LocalPlayer::new(guild_id.clone()),
            fail_destroy: self.fail_destroy.load(Ordering::SeqCst),
            destroy_calls: AtomicUsize::new(0),
        });
        self.created.lock().push(player.clone());
        player
    }
}

/// [`LocalVoiceClient`] that also records teardown calls.
pub struct TestVoiceClient {
    pub inner: LocalVoiceClient,
    destroyed: Mutex<Vec<GuildId>>,
    pub closes: AtomicUsize,
    fail_destroy: AtomicBool,
}

impl TestVoiceClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: LocalVoiceClient::new(UserId(1)),
            destroyed: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
            fail_destroy: AtomicBool::new(false),
        })
    }

    pub fn destroyed(&self) -> Vec<GuildId> {
        self.destroyed.lock().clone()
    }

    pub fn fail_destroy(&self) {
        self.fail_destroy.store(true, Ordering::SeqCst);
    }
}

impl VoiceClient for TestVoiceClient {
    fn get_connection(&self, guild_id: &GuildId) -> Option<Arc<dyn MediaConnection>> {
        self.inner.get_connection(guild_id)
    }

    fn create_connection(&self, guild_id: &GuildId) -> Arc<dyn MediaConnection> {
        self.inner.create_connection(guild_id)
    }

    fn destroy_connection(&self, guild_id: &GuildId) -> AnyResult<()> {
        self.destroyed.lock().push(guild_id.clone());
        self.inner.destroy_connection(guild_id)?;
        if self.fail_destroy.load(Ordering::SeqCst) {
            return Err("voice release failed".into());
        }
        Ok(())
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close();
    }
}

pub struct Fixture {
    pub session: Arc<Session>,
    pub transport: Arc<RecordingTransport>,
    pub observer: Arc<RecordingObserver>,
    pub owner: Arc<RecordingOwner>,
    pub engine: Arc<TestEngine>,
    pub voice: Arc<TestVoiceClient>,
}

pub struct FixtureBuilder {
    resume_key: Option<String>,
    resume_timeout_secs: u64,
    timeout_override: Option<u64>,
    extra_observers: Vec<Arc<dyn LifecycleObserver>>,
}

impl FixtureBuilder {
    pub fn resume_key(mut self, key: &str) -> Self {
        self.resume_key = Some(key.to_string());
        self
    }

    pub fn resume_timeout_secs(mut self, secs: u64) -> Self {
        self.resume_timeout_secs = secs;
        self
    }

    /// Handshake-supplied override of the configured resume timeout.
    pub fn timeout_override(mut self, secs: u64) -> Self {
        self.timeout_override = Some(secs);
        self
    }

    /// Registered ahead of the recording observer.
    pub fn observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.extra_observers.push(observer);
        self
    }

    pub fn build(self) -> Fixture {
        let transport = RecordingTransport::new();
        let observer = RecordingObserver::new();
        let owner = Arc::new(RecordingOwner::default());
        let engine = Arc::new(TestEngine::default());
        let voice = TestVoiceClient::new();

        let mut observers = self.extra_observers;
        observers.push(observer.clone());

        let owner_dyn: Arc<dyn OwningRegistry> = owner.clone();
        let owner_weak: Weak<dyn OwningRegistry> = Arc::downgrade(&owner_dyn);

        let session = Session::new(
            SessionIdentity {
                session_id: SessionId::from("test-session"),
                user_id: UserId(1),
                client_name: Some("tests".into()),
                resume_key: self.resume_key,
                resume_timeout_secs: self.timeout_override,
            },
            SessionConfig {
                resume_timeout_secs: self.resume_timeout_secs,
                ..SessionConfig::default()
            },
            Some(transport.clone()),
            SessionDeps {
                audio: engine.clone(),
                voice: voice.clone(),
                owner: owner_weak,
                observers,
            },
        );
        Fixture {
            session,
            transport,
            observer,
            owner,
            engine,
            voice,
        }
    }
}

pub fn fixture() -> FixtureBuilder {
    FixtureBuilder {
        resume_key: None,
        resume_timeout_secs: 60,
        timeout_override: None,
        extra_observers: Vec::new(),
    }
}
