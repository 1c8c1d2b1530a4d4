//! Battle-Crawler: a resumable battle-statistics harvester
//!
//! This crate walks a seed player's battle history on a public statistics API,
//! discovers related battles and players transitively, fetches the detail
//! records for each, and checkpoints the growing dataset so that a multi-hour
//! crawl survives restarts, rate limiting, and transient network failures.

pub mod api;
pub mod config;
pub mod crawler;
pub mod fetch;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

pub use fetch::FetchError;
pub use storage::StorageError;

/// Main error type for Battle-Crawler operations
#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("No battle list returned for seed player {player_id}")]
    MissingSeedData { player_id: String },

    #[error("Empty battle detail for arena {arena_id}")]
    MissingBattleDetail { arena_id: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrawlerError {
    /// Classifies this error for recovery decisions
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Fetch(e) => e.kind(),
            Self::Storage(_) => ErrorKind::PersistenceError,
            _ => ErrorKind::Fatal,
        }
    }

    /// Returns true if this error only signals a requested stop
    pub fn is_interrupted(&self) -> bool {
        self.kind() == ErrorKind::Interrupted
    }
}

/// Failure taxonomy shared by the fetch layer and the orchestrator
///
/// | Kind | Handling |
/// |------|----------|
/// | TransientNetwork | retried by the fetch adapter |
/// | RateLimited | retried after `Retry-After` or backoff |
/// | RemoteServerError | retried with backoff |
/// | RemoteClientError | not retried, item treated as "no data" |
/// | DecodeError | item failure, propagated |
/// | PersistenceError | logged and swallowed |
/// | Interrupted | clean pause |
/// | Fatal | checkpoint, then surfaced to the caller |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TransientNetwork,
    RateLimited,
    RemoteServerError,
    RemoteClientError,
    DecodeError,
    PersistenceError,
    Interrupted,
    Fatal,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Battle-Crawler operations
pub type Result<T> = std::result::Result<T, CrawlerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlObserver, CrawlOutcome, Coordinator, StopSignal};
pub use output::{ExportData, ExportWriter};
pub use state::{CrawlState, Phase};
pub use storage::ProgressStore;
