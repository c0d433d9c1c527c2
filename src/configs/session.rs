use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-session timing knobs shared by every session the node creates.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    /// Grace window a paused session waits for a resume before teardown.
    #[serde(default = "default_resume_timeout_secs")]
    pub resume_timeout_secs: u64,
    #[serde(default = "default_player_update_interval_secs")]
    pub player_update_interval_secs: u64,
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

impl SessionConfig {
    pub fn player_update_interval(&self) -> Duration {
        Duration::from_secs(self.player_update_interval_secs.max(1))
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs.max(1))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            resume_timeout_secs: default_resume_timeout_secs(),
            player_update_interval_secs: default_player_update_interval_secs(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

fn default_resume_timeout_secs() -> u64 {
    60
}

fn default_player_update_interval_secs() -> u64 {
    5
}

fn default_stats_interval_secs() -> u64 {
    60
}
