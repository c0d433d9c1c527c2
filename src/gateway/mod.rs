//! Voice transport collaborator boundary.
//!
//! A [`VoiceClient`] is created per session and owns that session's
//! guild-scoped media connections.

use std::{net::SocketAddr, sync::Arc};

use crate::common::types::{AnyResult, GuildId};

pub mod local;

pub use local::{LocalMediaConnection, LocalVoiceClient};

/// Receives notifications from a single media connection.
pub trait VoiceEventListener: Send + Sync {
    fn gateway_closed(&self, code: u16, reason: Option<String>, by_remote: bool);

    fn gateway_ready(&self, target: SocketAddr, ssrc: u32);
}

pub trait MediaConnection: Send + Sync {
    fn guild_id(&self) -> &GuildId;

    /// Accepts exactly one listener for the lifetime of the connection.
    fn register_listener(&self, listener: Arc<dyn VoiceEventListener>) -> AnyResult<()>;
}

pub trait VoiceClient: Send + Sync {
    fn get_connection(&self, guild_id: &GuildId) -> Option<Arc<dyn MediaConnection>>;

    fn create_connection(&self, guild_id: &GuildId) -> Arc<dyn MediaConnection>;

    /// Releases the connection for `guild_id`; a no-op when none exists.
    fn destroy_connection(&self, guild_id: &GuildId) -> AnyResult<()>;

    /// Releases every connection this client owns.
    fn close(&self);
}
