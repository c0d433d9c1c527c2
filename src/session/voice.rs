use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use dashmap::{DashMap, mapref::entry::Entry};
use tracing::{debug, warn};

use crate::{
    common::types::GuildId,
    gateway::{MediaConnection, VoiceClient, VoiceEventListener},
};

/// Guild-scoped media connections of one session.
///
/// Lookup and creation for a guild happen under that guild's map entry, so
/// racing first accesses produce one connection and one listener.
pub struct VoiceConnections {
    client: Arc<dyn VoiceClient>,
    bound: DashMap<GuildId, Arc<dyn MediaConnection>>,
    closed: AtomicBool,
}

impl VoiceConnections {
    pub fn new(client: Arc<dyn VoiceClient>) -> Self {
        Self {
            client,
            bound: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the live connection for `guild_id`, creating it and
    /// registering `listener` when the client has none. `None` once closed.
    pub fn get_or_create<F>(&self, guild_id: &GuildId, listener: F) -> Option<Arc<dyn MediaConnection>>
    where
        F: FnOnce() -> Arc<dyn VoiceEventListener>,
    {
        match self.bound.entry(guild_id.clone()) {
            Entry::Occupied(mut entry) => {
                if self.closed.load(Ordering::SeqCst) {
                    return None;
                }
                if let Some(live) = self.client.get_connection(guild_id) {
                    if !std::ptr::addr_eq(Arc::as_ptr(&live), Arc::as_ptr(entry.get())) {
                        entry.insert(live.clone());
                    }
                    return Some(live);
                }
                // The client dropped it behind our back
                let conn = self.create(guild_id, listener);
                entry.insert(conn.clone());
                Some(conn)
            }
            Entry::Vacant(entry) => {
                if self.closed.load(Ordering::SeqCst) {
                    return None;
                }
                let conn = match self.client.get_connection(guild_id) {
                    Some(existing) => existing,
                    None => self.create(guild_id, listener),
                };
                entry.insert(conn.clone());
                Some(conn)
            }
        }
    }

    fn create<F>(&self, guild_id: &GuildId, listener: F) -> Arc<dyn MediaConnection>
    where
        F: FnOnce() -> Arc<dyn VoiceEventListener>,
    {
        let conn = self.client.create_connection(guild_id);
        if let Err(e) = conn.register_listener(listener()) {
            warn!("[{}] Failed to register voice listener: {}", guild_id, e);
        }
        debug!("[{}] Media connection bound", guild_id);
        conn
    }

    /// Releases the guild's connection whether or not one is known.
    pub fn destroy(&self, guild_id: &GuildId) {
        self.bound.remove(guild_id);
        if let Err(e) = self.client.destroy_connection(guild_id) {
            warn!("[{}] Voice connection teardown failed: {}", guild_id, e);
        }
    }

    pub fn len(&self) -> usize {
        self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }

    /// Destroys every bound connection, then closes the client.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let guilds: Vec<GuildId> = self.bound.iter().map(|kv| kv.key().clone()).collect();
        for guild_id in &guilds {
            self.destroy(guild_id);
        }
        self.client.close();
    }
}
