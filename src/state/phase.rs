/// Crawl phase definitions
///
/// This module defines every stage a crawl session can be in. Exactly one
/// phase is active at a time and only the coordinator moves between them.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current stage of a crawl session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    // ===== Initial State =====
    /// Session created, nothing fetched yet
    NotStarted,

    // ===== Working States =====
    /// Fetching the seed player's battle list
    SeedFetch,

    /// Draining the arena work queue
    BattleDetails,

    /// Building and walking the sampled player pool
    PlayerPoolDiscovery,

    /// Fetching per-player detail records
    PlayerDetails,

    // ===== Terminal State =====
    /// Every phase finished
    Completed,

    // ===== Resumable Stop States =====
    /// Stopped on request, resumable
    Paused,

    /// Stopped by a fatal error, resumable
    Error,
}

impl Phase {
    /// Returns true once the crawl has finished for good
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns true for phases in which the coordinator is fetching
    pub fn is_working(&self) -> bool {
        matches!(
            self,
            Self::SeedFetch | Self::BattleDetails | Self::PlayerPoolDiscovery | Self::PlayerDetails
        )
    }

    /// Returns true if a run stopped in this phase can be continued
    ///
    /// Working phases are included: a process killed mid-phase leaves its last
    /// working phase in the checkpoint.
    pub fn is_resumable(&self) -> bool {
        !self.is_terminal()
    }

    /// Stable name used in checkpoints and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::SeedFetch => "SEED_FETCH",
            Self::BattleDetails => "BATTLE_DETAILS",
            Self::PlayerPoolDiscovery => "PLAYER_POOL_DISCOVERY",
            Self::PlayerDetails => "PLAYER_DETAILS",
            Self::Completed => "COMPLETED",
            Self::Paused => "PAUSED",
            Self::Error => "ERROR",
        }
    }

}

impl Default for Phase {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
