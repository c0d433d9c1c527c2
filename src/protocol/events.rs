use serde::Serialize;

use crate::common::types::{GuildId, SessionId};
use crate::protocol::{PlayerState, Stats};

/// Messages sent from server to client over the websocket.
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OutgoingMessage {
    Ready {
        resumed: bool,
        session_id: SessionId,
    },
    PlayerUpdate {
        guild_id: GuildId,
        state: PlayerState,
    },
    Stats {
        #[serde(flatten)]
        stats: Stats,
    },
    Event {
        #[serde(flatten)]
        event: RelayEvent,
    },
}

/// Events pushed to the client outside of request/response flow.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum RelayEvent {
    #[serde(rename = "WebSocketClosedEvent")]
    WebSocketClosed {
        guild_id: GuildId,
        code: u16,
        reason: String,
        by_remote: bool,
    },
}
