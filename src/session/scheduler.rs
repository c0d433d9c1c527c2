use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use tokio::{runtime::Handle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    monitoring::StatsCollector,
    protocol::OutgoingMessage,
    session::{Session, SessionState},
};

/// Low-frequency maintenance: a `stats` push every `period`, starting
/// immediately, while the session is open.
pub(crate) fn spawn_stats_task(
    runtime: &Handle,
    session: Weak<Session>,
    collector: Arc<StatsCollector>,
    period: Duration,
    cancel: CancellationToken,
) {
    runtime.spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let Some(session) = session.upgrade() else { break };
                    if session.state() != SessionState::Open {
                        continue;
                    }
                    let stats = collector.collect(session.player_count(), session.playing_players().len());
                    trace!("Pushing stats: session={}", session.session_id());
                    session.send_message(&OutgoingMessage::Stats { stats });
                }
            }
        }
        debug!("Stats task stopped");
    });
}

/// Periodic `playerUpdate` for every playing player. Runs apart from the
/// stats task so a slow transport on one cannot delay the other.
pub(crate) fn spawn_player_update_task(
    runtime: &Handle,
    session: Weak<Session>,
    period: Duration,
    cancel: CancellationToken,
) {
    runtime.spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let Some(session) = session.upgrade() else { break };
                    for player in session.playing_players() {
                        session.send_player_update(&player);
                    }
                }
            }
        }
        debug!("Player update task stopped");
    });
}
