use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicI64, Ordering},
    },
    time::Instant,
};

use parking_lot::Mutex;
use tracing::debug;

use crate::{
    common::types::{AnyResult, GuildId, SessionId, now_ms},
    player::{AudioEngine, Player},
    protocol::PlayerState,
};

/// In-process player that tracks playback bookkeeping without producing
/// audio. Decoding is delegated to whatever feeds the voice connection.
pub struct LocalPlayer {
    guild_id: GuildId,
    playback: Mutex<Playback>,
    connected: AtomicBool,
    ping: AtomicI64,
    destroyed: AtomicBool,
}

#[derive(Default)]
struct Playback {
    track: Option<String>,
    paused: bool,
    /// Position accumulated before the current run started.
    position: u64,
    running_since: Option<Instant>,
}

impl Playback {
    fn position(&self) -> u64 {
        let running = self
            .running_since
            .map(|since| since.elapsed().as_millis() as u64)
            .unwrap_or(0);
        self.position + running
    }
}

impl LocalPlayer {
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            playback: Mutex::new(Playback::default()),
            connected: AtomicBool::new(false),
            ping: AtomicI64::new(-1),
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn play(&self, track: impl Into<String>) {
        let mut playback = self.playback.lock();
        playback.track = Some(track.into());
        playback.paused = false;
        playback.position = 0;
        playback.running_since = Some(Instant::now());
    }

    pub fn set_paused(&self, paused: bool) {
        let mut playback = self.playback.lock();
        if playback.paused == paused || playback.track.is_none() {
            playback.paused = paused;
            return;
        }
        if paused {
            playback.position = playback.position();
            playback.running_since = None;
        } else {
            playback.running_since = Some(Instant::now());
        }
        playback.paused = paused;
    }

    pub fn stop(&self) {
        *self.playback.lock() = Playback::default();
    }

    pub fn set_connected(&self, connected: bool, ping: i64) {
        self.connected.store(connected, Ordering::Relaxed);
        self.ping.store(if connected { ping } else { -1 }, Ordering::Relaxed);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

impl Player for LocalPlayer {
    fn guild_id(&self) -> &GuildId {
        &self.guild_id
    }

    fn is_playing(&self) -> bool {
        let playback = self.playback.lock();
        playback.track.is_some() && !playback.paused
    }

    fn state(&self) -> PlayerState {
        PlayerState {
            time: now_ms(),
            position: self.playback.lock().position(),
            connected: self.connected.load(Ordering::Relaxed),
            ping: self.ping.load(Ordering::Relaxed),
        }
    }

    fn destroy(&self) -> AnyResult<()> {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            debug!("[{}] Player destroyed", self.guild_id);
            self.stop();
            self.set_connected(false, -1);
        }
        Ok(())
    }
}

/// Engine handing out [`LocalPlayer`]s.
#[derive(Default)]
pub struct LocalAudioEngine;

impl LocalAudioEngine {
    pub fn new() -> Self {
        Self
    }
}

impl AudioEngine for LocalAudioEngine {
    fn create_player(&self, session_id: &SessionId, guild_id: &GuildId) -> Arc<dyn Player> {
        debug!("Creating player: session={} guild={}", session_id, guild_id);
        Arc::new(LocalPlayer::new(guild_id.clone()))
    }
}
