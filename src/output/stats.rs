//! Statistics generated from a crawl checkpoint
//!
//! This module summarises a saved `CrawlState` for the `--status` view.

use crate::state::{CrawlState, Phase, WorkQueue};
use chrono::{DateTime, Utc};

/// Progress of one resumable queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueProgress {
    pub cursor: usize,
    pub total: usize,
    pub processed: usize,
}

impl From<&WorkQueue> for QueueProgress {
    fn from(queue: &WorkQueue) -> Self {
        Self {
            cursor: queue.cursor,
            total: queue.len(),
            processed: queue.processed.len(),
        }
    }
}

impl QueueProgress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.cursor as f64 / self.total as f64) * 100.0
        }
    }
}

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    pub session_id: String,
    pub initial_player_id: String,
    pub phase: Phase,
    pub started_at: DateTime<Utc>,
    pub last_checkpoint: DateTime<Utc>,

    /// Arenas in the seed battle list
    pub seed_battles: usize,

    pub arenas: QueueProgress,
    pub player_pool: QueueProgress,
    pub player_details: QueueProgress,

    pub battle_details: usize,
    pub players: usize,

    /// Distinct players referenced by fetched battle details
    pub referenced_players: usize,
}

impl CrawlStatistics {
    pub fn from_state(state: &CrawlState) -> Self {
        Self {
            session_id: state.session_id.clone(),
            initial_player_id: state.initial_player_id.clone(),
            phase: state.current_phase,
            started_at: state.start_time,
            last_checkpoint: state.last_checkpoint,
            seed_battles: state
                .combined_battles
                .as_ref()
                .map(|list| list.data.len())
                .unwrap_or(0),
            arenas: QueueProgress::from(&state.arena_work),
            player_pool: QueueProgress::from(&state.player_pool_work),
            player_details: QueueProgress::from(&state.player_detail_work),
            battle_details: state.battle_details.len(),
            players: state.players.len(),
            referenced_players: state.referenced_player_ids().len(),
        }
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Session:");
    println!("  Id: {}", stats.session_id);
    println!("  Seed player: {}", stats.initial_player_id);
    if stats.phase.is_working() {
        println!("  Phase: {} (interrupted, will resume)", stats.phase);
    } else {
        println!("  Phase: {}", stats.phase);
    }
    println!("  Started: {}", stats.started_at.to_rfc3339());
    println!("  Last checkpoint: {}", stats.last_checkpoint.to_rfc3339());
    let elapsed = stats.last_checkpoint - stats.started_at;
    println!(
        "  Elapsed: {}h {:02}m {:02}s",
        elapsed.num_hours(),
        elapsed.num_minutes() % 60,
        elapsed.num_seconds() % 60
    );
    println!();

    println!("Queues:");
    print_queue("Battle details", &stats.arenas);
    print_queue("Player pool", &stats.player_pool);
    print_queue("Player details", &stats.player_details);
    println!();

    println!("Collected:");
    println!("  Seed battles: {}", stats.seed_battles);
    println!("  Battle details: {}", stats.battle_details);
    println!("  Players referenced: {}", stats.referenced_players);
    println!("  Player records: {}", stats.players);
}

fn print_queue(label: &str, progress: &QueueProgress) {
    println!(
        "  {}: {}/{} ({:.1}%), {} processed",
        label,
        progress.cursor,
        progress.total,
        progress.percent(),
        progress.processed
    );
}
