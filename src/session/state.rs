use std::{sync::Arc, time::Duration};

use serde::Serialize;

use crate::{
    session::{outbound::Outbound, timer::ResumeTimer},
    transport::Transport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// A live transport is attached; messages go out immediately.
    Open,
    /// Transport lost; messages are buffered and the resume timer runs.
    Resumable,
    /// Terminal.
    Destroyed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Open => "OPEN",
            Self::Resumable => "RESUMABLE",
            Self::Destroyed => "DESTROYED",
        };
        f.write_str(name)
    }
}

/// Everything pause, resume, expiry, delivery and teardown must agree on.
/// Lives behind the session's single lifecycle lock.
pub(crate) struct Lifecycle {
    pub state: SessionState,
    pub outbound: Outbound,
    pub resume_key: Option<String>,
    pub resume_timeout: Duration,
    pub resume_timer: Option<ResumeTimer>,
    /// Bumped on every pause so a stale expiry can tell it lost the race.
    pub pause_epoch: u64,
}

/// What the lifecycle hands over to teardown once it is marked destroyed.
pub(crate) struct Released {
    pub transport: Option<Arc<dyn Transport>>,
    pub resume_timer: Option<ResumeTimer>,
    pub dropped: usize,
}

impl Lifecycle {
    pub fn new(
        transport: Option<Arc<dyn Transport>>,
        resume_key: Option<String>,
        resume_timeout: Duration,
    ) -> Self {
        Self {
            state: SessionState::Open,
            outbound: Outbound::new(transport),
            resume_key,
            resume_timeout,
            resume_timer: None,
            pause_epoch: 0,
        }
    }

    /// Moves to `Destroyed` and releases the transport, timer and buffer.
    /// Returns `None` if the session was already destroyed.
    pub fn release(&mut self) -> Option<Released> {
        if self.state == SessionState::Destroyed {
            return None;
        }
        self.state = SessionState::Destroyed;
        Some(Released {
            transport: self.outbound.detach(),
            resume_timer: self.resume_timer.take(),
            dropped: self.outbound.clear(),
        })
    }
}
