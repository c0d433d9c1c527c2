use std::{
    net::SocketAddr,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, Ordering},
    },
};

use dashmap::DashMap;
use tracing::{debug, info};

use crate::{
    common::types::{AnyResult, GuildId, UserId},
    gateway::{MediaConnection, VoiceClient, VoiceEventListener},
};

/// Bookkeeping-only media connection. Gateway notifications are injected
/// through [`LocalMediaConnection::emit_closed`] and
/// [`LocalMediaConnection::emit_ready`].
pub struct LocalMediaConnection {
    guild_id: GuildId,
    listener: OnceLock<Arc<dyn VoiceEventListener>>,
    open: AtomicBool,
}

impl LocalMediaConnection {
    fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            listener: OnceLock::new(),
            open: AtomicBool::new(true),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn has_listener(&self) -> bool {
        self.listener.get().is_some()
    }

    pub fn emit_closed(&self, code: u16, reason: Option<String>, by_remote: bool) {
        if let Some(listener) = self.listener.get() {
            listener.gateway_closed(code, reason, by_remote);
        }
    }

    pub fn emit_ready(&self, target: SocketAddr, ssrc: u32) {
        if let Some(listener) = self.listener.get() {
            listener.gateway_ready(target, ssrc);
        }
    }

    fn release(&self) {
        self.open.store(false, Ordering::Release);
    }
}

impl MediaConnection for LocalMediaConnection {
    fn guild_id(&self) -> &GuildId {
        &self.guild_id
    }

    fn register_listener(&self, listener: Arc<dyn VoiceEventListener>) -> AnyResult<()> {
        self.listener
            .set(listener)
            .map_err(|_| format!("[{}] listener already registered", self.guild_id).into())
    }
}

/// Per-session voice client keeping its connections in memory.
pub struct LocalVoiceClient {
    user_id: UserId,
    connections: DashMap<GuildId, Arc<LocalMediaConnection>>,
}

impl LocalVoiceClient {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            connections: DashMap::new(),
        }
    }

    /// Typed access for callers that need to drive gateway notifications.
    pub fn connection(&self, guild_id: &GuildId) -> Option<Arc<LocalMediaConnection>> {
        self.connections.get(guild_id).map(|c| c.value().clone())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl VoiceClient for LocalVoiceClient {
    fn get_connection(&self, guild_id: &GuildId) -> Option<Arc<dyn MediaConnection>> {
        self.connection(guild_id)
            .map(|c| c as Arc<dyn MediaConnection>)
    }

    fn create_connection(&self, guild_id: &GuildId) -> Arc<dyn MediaConnection> {
        let conn = Arc::new(LocalMediaConnection::new(guild_id.clone()));
        if let Some(previous) = self.connections.insert(guild_id.clone(), conn.clone()) {
            previous.release();
        }
        debug!("[{}] Media connection created for user {}", guild_id, self.user_id);
        conn
    }

    fn destroy_connection(&self, guild_id: &GuildId) -> AnyResult<()> {
        if let Some((_, conn)) = self.connections.remove(guild_id) {
            conn.release();
            debug!("[{}] Media connection destroyed", guild_id);
        }
        Ok(())
    }

    fn close(&self) {
        let count = self.connections.len();
        self.connections.retain(|_, conn| {
            conn.release();
            false
        });
        info!("Voice client for user {} closed ({} connections)", self.user_id, count);
    }
}
