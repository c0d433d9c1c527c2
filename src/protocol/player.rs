use serde::Serialize;

use crate::common::types::GuildId;

/// Point-in-time playback state pushed with `playerUpdate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    /// Unix timestamp in milliseconds.
    pub time: u64,
    /// Playback position in milliseconds.
    pub position: u64,
    /// Whether the player is connected to a voice channel.
    pub connected: bool,
    /// Voice gateway ping in milliseconds. -1 if not connected.
    pub ping: i64,
}

/// One entry of `GET /v4/sessions/{id}/players`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    pub guild_id: GuildId,
    pub playing: bool,
    pub state: PlayerState,
}
