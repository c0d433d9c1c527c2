use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use dashmap::{DashMap, mapref::entry::Entry};

use crate::{common::types::GuildId, player::Player};

/// Guild to player map for one session. Creation and removal are atomic per
/// guild; readers copy out before iterating so no shard lock is held while
/// player methods run.
pub struct PlayerRegistry {
    players: DashMap<GuildId, Arc<dyn Player>>,
    closed: AtomicBool,
}

/// Result of [`PlayerRegistry::get_or_create`].
pub enum Lookup {
    Existing(Arc<dyn Player>),
    Created(Arc<dyn Player>),
    /// The registry has been closed by teardown.
    Closed,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self {
            players: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the guild's player, building it with `create` if absent.
    /// Concurrent callers for the same unseen guild observe exactly one
    /// `Created`.
    pub fn get_or_create<F>(&self, guild_id: &GuildId, create: F) -> Lookup
    where
        F: FnOnce() -> Arc<dyn Player>,
    {
        match self.players.entry(guild_id.clone()) {
            Entry::Occupied(entry) => Lookup::Existing(entry.get().clone()),
            Entry::Vacant(entry) => {
                // Checked under the shard lock so teardown's sweep sees every
                // insert that got past this point.
                if self.closed.load(Ordering::SeqCst) {
                    return Lookup::Closed;
                }
                let player = create();
                entry.insert(player.clone());
                Lookup::Created(player)
            }
        }
    }

    pub fn get(&self, guild_id: &GuildId) -> Option<Arc<dyn Player>> {
        self.players.get(guild_id).map(|p| p.value().clone())
    }

    pub fn remove(&self, guild_id: &GuildId) -> Option<Arc<dyn Player>> {
        self.players.remove(guild_id).map(|(_, player)| player)
    }

    pub fn snapshot(&self) -> HashMap<GuildId, Arc<dyn Player>> {
        self.players
            .iter()
            .map(|kv| (kv.key().clone(), kv.value().clone()))
            .collect()
    }

    pub fn playing(&self) -> Vec<Arc<dyn Player>> {
        let players: Vec<_> = self.players.iter().map(|kv| kv.value().clone()).collect();
        players.into_iter().filter(|p| p.is_playing()).collect()
    }

    pub fn guild_ids(&self) -> Vec<GuildId> {
        self.players.iter().map(|kv| kv.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Refuses further creation. Existing entries stay until removed.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Default for PlayerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
