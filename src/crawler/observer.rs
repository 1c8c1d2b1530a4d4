//! Observer surface for crawl events
//!
//! The coordinator reports everything a UI or CLI could show through
//! [`CrawlObserver`]. Every method has an empty default, so implementors
//! only override what they consume.

use crate::output::ExportData;
use crate::state::Phase;
use crate::CrawlerError;
use std::sync::Arc;
use tracing::Level;

/// Receives crawl events from the coordinator
///
/// Events arrive on the coordinator's task; implementations must not block.
/// Data handed over is a frozen snapshot, never the live state.
pub trait CrawlObserver: Send + Sync {
    /// Called on every actual phase transition
    fn on_phase_changed(&self, _phase: Phase) {}

    /// Called before each fetch with a 1-based position
    fn on_progress(&self, _current: usize, _total: usize, _message: &str) {}

    /// Crawl journal line, already mirrored to `tracing`
    fn on_log(&self, _level: Level, _message: &str) {}

    /// Called when the crawl stops on an error
    fn on_error(&self, _error: &CrawlerError, _fatal: bool) {}

    /// Called at every checkpoint with the partial dataset
    fn on_data_collected(&self, _data: Arc<ExportData>) {}

    /// Called once with the final dataset
    fn on_complete(&self, _data: Arc<ExportData>) {}
}

/// Observer that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl CrawlObserver for NoopObserver {}

/// Observer reporting through `tracing`, used by the command-line binary
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl CrawlObserver for TracingObserver {
    fn on_phase_changed(&self, phase: Phase) {
        tracing::info!("Phase: {}", phase);
    }

    fn on_progress(&self, current: usize, total: usize, message: &str) {
        tracing::debug!("[{}/{}] {}", current, total, message);
    }

    fn on_error(&self, error: &CrawlerError, fatal: bool) {
        if fatal {
            tracing::error!("Crawl failed: {}", error);
        } else {
            tracing::warn!("{}", error);
        }
    }

    fn on_data_collected(&self, data: Arc<ExportData>) {
        tracing::debug!(
            "Checkpoint: {} battle details, {} players",
            data.battle_details.len(),
            data.players.len()
        );
    }

    fn on_complete(&self, data: Arc<ExportData>) {
        tracing::info!(
            "Dataset complete: {} battle details, {} players",
            data.battle_details.len(),
            data.players.len()
        );
    }
}
