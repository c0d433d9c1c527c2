//! Player collaborator boundary.
//!
//! The session supervisor owns the existence of players (create on first
//! access, explicit destroy) but never their playback internals.

use std::sync::Arc;

use crate::{
    common::types::{AnyResult, GuildId, SessionId},
    protocol::PlayerState,
};

pub mod local;

pub use local::{LocalAudioEngine, LocalPlayer};

/// One guild's audio playback state machine.
pub trait Player: Send + Sync {
    fn guild_id(&self) -> &GuildId;

    fn is_playing(&self) -> bool;

    /// Snapshot pushed to the client with `playerUpdate`.
    fn state(&self) -> PlayerState;

    /// Releases playback resources. Called once, after the player has left
    /// the registry.
    fn destroy(&self) -> AnyResult<()>;
}

/// Shared handle used to construct players. One engine serves every
/// session on the node.
pub trait AudioEngine: Send + Sync {
    fn create_player(&self, session_id: &SessionId, guild_id: &GuildId) -> Arc<dyn Player>;
}
