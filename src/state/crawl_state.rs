use crate::api::{BattleDetail, BattleList, PlayerDetail};
use crate::state::Phase;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Resumable queue of entity ids
///
/// `pending` is the ordered work list walked by `cursor`; `queued` remembers
/// every id ever enqueued so nothing is appended twice, and `processed` holds
/// ids whose fetch finished. An id in `processed` is never fetched again.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkQueue {
    #[serde(default)]
    pub pending: Vec<u64>,

    #[serde(default)]
    pub queued: BTreeSet<u64>,

    #[serde(default)]
    pub processed: BTreeSet<u64>,

    #[serde(default)]
    pub cursor: usize,

    /// Whether the initial population of this queue has happened
    #[serde(default)]
    pub built: bool,
}

impl WorkQueue {
    /// Appends an id unless it was already queued or processed
    ///
    /// Returns true if the id was added.
    pub fn enqueue(&mut self, id: u64) -> bool {
        if self.processed.contains(&id) {
            return false;
        }
        if self.queued.insert(id) {
            self.pending.push(id);
            true
        } else {
            false
        }
    }

    /// Replaces the work list and rewinds the cursor
    pub fn replace(&mut self, ids: Vec<u64>) {
        self.pending = ids;
        self.queued = self.pending.iter().copied().collect();
        self.queued.extend(self.processed.iter().copied());
        self.cursor = 0;
        self.built = true;
    }

    /// Returns the id at the given index of the work list
    pub fn id_at(&self, index: usize) -> Option<u64> {
        self.pending.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Returns true if the cursor reached the end of the work list
    pub fn is_drained(&self) -> bool {
        self.cursor >= self.pending.len()
    }

    /// Number of entries at or after the cursor
    pub fn remaining(&self) -> usize {
        self.pending.len().saturating_sub(self.cursor)
    }

    pub fn is_processed(&self, id: u64) -> bool {
        self.processed.contains(&id)
    }

    pub fn mark_processed(&mut self, id: u64) {
        self.processed.insert(id);
    }

    /// Moves the cursor, never past the end of the work list
    pub fn advance_to(&mut self, index: usize) {
        self.cursor = index.min(self.pending.len());
    }

    /// Repairs the set/list pairing after loading from disk
    pub fn normalize(&mut self) {
        self.queued.extend(self.processed.iter().copied());
        self.queued.extend(self.pending.iter().copied());
        self.cursor = self.cursor.min(self.pending.len());
    }
}

/// The checkpoint unit: everything needed to resume a crawl session
///
/// The coordinator owns the only mutable instance. Persistence, export and
/// observers always receive a clone taken at a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlState {
    pub session_id: String,
    pub initial_player_id: String,

    #[serde(default)]
    pub current_phase: Phase,

    /// Upper bound on the sampled player pool
    #[serde(default)]
    pub total_players_to_fetch: usize,

    /// Seed player's battle list, exported alongside the results
    #[serde(default)]
    pub combined_battles: Option<BattleList>,

    #[serde(default)]
    pub arena_work: WorkQueue,

    #[serde(default)]
    pub player_pool_work: WorkQueue,

    #[serde(default)]
    pub player_detail_work: WorkQueue,

    #[serde(default)]
    pub battle_details: Vec<BattleDetail>,

    #[serde(default)]
    pub players: Vec<PlayerDetail>,

    pub start_time: DateTime<Utc>,
    pub last_checkpoint: DateTime<Utc>,

    /// Hash of the configuration the session was started with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
}

impl CrawlState {
    /// Creates a fresh session for the given seed player
    pub fn new(initial_player_id: impl Into<String>, total_players_to_fetch: usize) -> Self {
        let now = Utc::now();
        Self {
            session_id: format!("session_{}", now.timestamp_millis()),
            initial_player_id: initial_player_id.into(),
            current_phase: Phase::NotStarted,
            total_players_to_fetch,
            combined_battles: None,
            arena_work: WorkQueue::default(),
            player_pool_work: WorkQueue::default(),
            player_detail_work: WorkQueue::default(),
            battle_details: Vec::new(),
            players: Vec::new(),
            start_time: now,
            last_checkpoint: now,
            config_hash: None,
        }
    }

    /// Repairs invariants of a state read back from disk
    pub fn normalize(&mut self) {
        self.arena_work.normalize();
        self.player_pool_work.normalize();
        self.player_detail_work.normalize();
    }

    /// Returns true once the seed battle list has been fetched
    pub fn is_seeded(&self) -> bool {
        self.arena_work.built
    }

    /// Records the seed battle list and queues its arenas
    ///
    /// Returns the number of newly queued arena ids.
    pub fn seed_arenas(&mut self, list: BattleList) -> usize {
        let added = self.enqueue_arenas(list.arena_ids());
        self.combined_battles = Some(list);
        self.arena_work.built = true;
        added
    }

    /// Queues arena ids that were neither queued nor processed before
    pub fn enqueue_arenas(&mut self, ids: impl IntoIterator<Item = u64>) -> usize {
        ids.into_iter()
            .filter(|id| self.arena_work.enqueue(*id))
            .count()
    }

    /// Every distinct player id referenced by the fetched battle details
    pub fn referenced_player_ids(&self) -> BTreeSet<u64> {
        self.battle_details
            .iter()
            .flat_map(|detail| detail.player_ids())
            .collect()
    }

    /// Samples the player pool: shuffle all referenced players, keep at most
    /// `total_players_to_fetch`
    pub fn sample_player_pool<R: Rng + ?Sized>(&mut self, rng: &mut R) -> usize {
        let mut ids: Vec<u64> = self.referenced_player_ids().into_iter().collect();
        ids.shuffle(rng);
        ids.truncate(self.total_players_to_fetch);
        let sampled = ids.len();
        self.player_pool_work.replace(ids);
        sampled
    }

    /// Fills the player detail queue with every referenced player
    pub fn build_player_detail_queue(&mut self) -> usize {
        let ids: Vec<u64> = self.referenced_player_ids().into_iter().collect();
        let total = ids.len();
        self.player_detail_work.replace(ids);
        total
    }

    /// One-line description of every cursor, used in the resume journal
    pub fn resume_summary(&self) -> String {
        format!(
            "phase={}, battleDetailsIndex={}/{}, playerPoolIndex={}/{}, playerDetailsIndex={}/{}, battleDetailsCount={}, playersCount={}",
            self.current_phase,
            self.arena_work.cursor,
            self.arena_work.len(),
            self.player_pool_work.cursor,
            self.player_pool_work.len(),
            self.player_detail_work.cursor,
            self.player_detail_work.len(),
            self.battle_details.len(),
            self.players.len()
        )
    }
}
