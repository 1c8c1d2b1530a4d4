//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the crawl state machine. It coordinates:
//! - Loading the checkpoint or creating a new session
//! - Walking each work queue from its cursor, in order
//! - Checkpointing every `save-frequency` items on background lanes
//! - Pausing cleanly on a stop request and finalizing on completion or error

use crate::api::{Lookup, StatsApi};
use crate::config::Config;
use crate::crawler::{CrawlObserver, NoopObserver, StopSignal};
use crate::fetch::ApiClient;
use crate::output::ExportData;
use crate::state::{CrawlState, Phase};
use crate::storage::ProgressStore;
use crate::{ConfigError, CrawlerError, ExportWriter, Result};
use chrono::Utc;
use futures::StreamExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::Level;
use url::Url;

/// How a crawl run ended, when it did not fail
#[derive(Debug, Clone)]
pub enum CrawlOutcome {
    /// Every phase finished; carries the final dataset
    Completed(Arc<ExportData>),

    /// Stopped on request; carries the partial dataset
    Paused(Arc<ExportData>),
}

impl CrawlOutcome {
    pub fn data(&self) -> &Arc<ExportData> {
        match self {
            Self::Completed(data) | Self::Paused(data) => data,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Result of one step of the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Paused,
}

/// Returns early from the enclosing step when the given step paused
macro_rules! proceed {
    ($step:expr) => {
        if let Step::Paused = $step {
            return Ok(Step::Paused);
        }
    };
}

/// Main crawler coordinator structure
///
/// Owns the only mutable [`CrawlState`]. Everything handed to the
/// persistence lane, the export lane or the observer is a clone.
pub struct Coordinator {
    config: Arc<Config>,
    api: StatsApi,
    store: ProgressStore,
    exporter: ExportWriter,
    observer: Arc<dyn CrawlObserver>,
    stop: StopSignal,
    state: CrawlState,
    resumed: bool,
    rng: StdRng,
    since_checkpoint: usize,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `fresh` - Whether to start a fresh crawl (clears the checkpoint)
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(CrawlerError)` - Failed to initialize
    pub fn new(config: Config, fresh: bool) -> Result<Self> {
        let store = ProgressStore::new(&config.output.data_dir)?;
        if fresh {
            tracing::info!("Fresh crawl requested, clearing checkpoint");
            store.clear()?;
        }

        let loaded = if fresh { None } else { store.load() };
        let (state, resumed) = match loaded {
            Some(state) if state.initial_player_id != config.crawler.initial_player_id => {
                tracing::warn!(
                    "Checkpoint belongs to seed player {}, starting a new session for {}",
                    state.initial_player_id,
                    config.crawler.initial_player_id
                );
                (new_state(&config), false)
            }
            Some(state) if !state.current_phase.is_resumable() => {
                tracing::info!("Previous session {} already completed", state.session_id);
                (new_state(&config), false)
            }
            Some(mut state) => {
                if !state.player_pool_work.built {
                    state.total_players_to_fetch = config.crawler.max_players;
                }
                (state, true)
            }
            None => (new_state(&config), false),
        };

        let stop = StopSignal::new();
        let client = ApiClient::new(&config.http, stop.clone())?;
        let base_url = Url::parse(&config.http.base_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", config.http.base_url, e)))?;
        let api = StatsApi::new(Arc::new(client), base_url, config.http.region.clone());

        let rng = match config.crawler.shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            exporter: ExportWriter::new(&config.output.export_dir),
            config: Arc::new(config),
            api,
            store,
            observer: Arc::new(NoopObserver),
            stop,
            state,
            resumed,
            rng,
            since_checkpoint: 0,
        })
    }

    /// Records the configuration hash, warning if the checkpoint was
    /// created with a different configuration
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        let hash = hash.into();
        if let Some(previous) = &self.state.config_hash {
            if self.resumed && *previous != hash {
                tracing::warn!("Configuration changed since this session was checkpointed");
            }
        }
        self.state.config_hash = Some(hash);
        self
    }

    pub fn set_observer(&mut self, observer: Arc<dyn CrawlObserver>) {
        self.observer = observer;
    }

    /// Handle for requesting a cooperative stop
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn state(&self) -> &CrawlState {
        &self.state
    }

    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    pub fn exporter(&self) -> &ExportWriter {
        &self.exporter
    }

    /// Runs the crawl from the current state until it completes, pauses or
    /// fails
    ///
    /// Progress is checkpointed in every case. A paused or failed session is
    /// continued by creating a new coordinator and calling `run` again.
    pub async fn run(&mut self) -> Result<CrawlOutcome> {
        self.stop.reset();

        if self.resumed {
            self.log(
                Level::INFO,
                format!(
                    "Resuming session {}: {}",
                    self.state.session_id,
                    self.state.resume_summary()
                ),
            );
        } else {
            self.log(
                Level::INFO,
                format!(
                    "Starting session {} from player {}",
                    self.state.session_id, self.state.initial_player_id
                ),
            );
        }

        let result = self.execute().await;
        self.finalize(result).await
    }

    async fn execute(&mut self) -> Result<Step> {
        proceed!(self.seed_fetch().await?);
        proceed!(self.drain_arenas().await?);
        proceed!(self.walk_player_pool().await?);
        proceed!(self.drain_arenas().await?);
        proceed!(self.fetch_player_details().await?);
        Ok(Step::Continue)
    }

    // ===== Phases =====

    async fn seed_fetch(&mut self) -> Result<Step> {
        if self.state.is_seeded() {
            return Ok(Step::Continue);
        }
        if self.stop.is_requested() {
            return Ok(Step::Paused);
        }

        self.set_phase(Phase::SeedFetch);
        let player_id = self.state.initial_player_id.clone();
        self.observer.on_progress(
            1,
            1,
            &format!("Fetching battle list for player {}", player_id),
        );

        let list = self
            .api
            .fetch_battle_list(&player_id, self.config.crawler.page_size)
            .await?
            .found()
            .ok_or_else(|| CrawlerError::MissingSeedData {
                player_id: player_id.clone(),
            })?;

        let added = self.state.seed_arenas(list);
        self.log(
            Level::INFO,
            format!("Seed player {}: {} arenas queued", player_id, added),
        );
        self.checkpoint();
        Ok(Step::Continue)
    }

    /// Drains the arena queue from its cursor
    ///
    /// Idempotent once the queue is drained. An empty detail response is
    /// fatal and leaves the cursor on that arena.
    async fn drain_arenas(&mut self) -> Result<Step> {
        if self.state.arena_work.is_drained() {
            return Ok(Step::Continue);
        }
        self.set_phase(Phase::BattleDetails);

        let concurrency = self.config.crawler.concurrency.max(1);
        let api = self.api.clone();

        while !self.state.arena_work.is_drained() {
            if self.stop.is_requested() {
                return Ok(Step::Paused);
            }

            let total = self.state.arena_work.len();
            let start = self.state.arena_work.cursor;
            let end = (start + concurrency).min(total);
            let batch: Vec<(usize, u64)> = (start..end)
                .filter_map(|i| self.state.arena_work.id_at(i).map(|id| (i, id)))
                .collect();
            let to_fetch: Vec<u64> = batch
                .iter()
                .map(|(_, id)| *id)
                .filter(|id| !self.state.arena_work.is_processed(*id))
                .collect();

            for (index, id) in &batch {
                if !self.state.arena_work.is_processed(*id) {
                    self.observer
                        .on_progress(index + 1, total, &format!("Battle detail {}", id));
                }
            }

            let mut results = api.battle_details(to_fetch, concurrency);
            for (index, id) in batch {
                if self.state.arena_work.is_processed(id) {
                    self.state.arena_work.advance_to(index + 1);
                    continue;
                }
                let Some((_, result)) = results.next().await else {
                    break;
                };

                match result? {
                    Lookup::Found(detail) => self.state.battle_details.push(detail),
                    Lookup::Skipped { status } => self.log(
                        Level::WARN,
                        format!("No battle detail for arena {} (HTTP {})", id, status),
                    ),
                    Lookup::Empty => {
                        return Err(CrawlerError::MissingBattleDetail { arena_id: id });
                    }
                }
                self.state.arena_work.mark_processed(id);
                self.state.arena_work.advance_to(index + 1);
                self.tick();
            }
        }

        self.log(
            Level::INFO,
            format!(
                "Arena queue drained: {} battle details",
                self.state.battle_details.len()
            ),
        );
        Ok(Step::Continue)
    }

    /// Builds the player pool once, then walks it
    ///
    /// Every player's battle list feeds new arenas into the arena queue,
    /// which is drained every `save-frequency` players. A failed fetch stops
    /// the run with the cursor on the failing player.
    async fn walk_player_pool(&mut self) -> Result<Step> {
        if !self.state.player_pool_work.built {
            if self.stop.is_requested() {
                return Ok(Step::Paused);
            }
            self.set_phase(Phase::PlayerPoolDiscovery);

            let referenced = self.state.referenced_player_ids().len();
            let sampled = self.state.sample_player_pool(&mut self.rng);
            self.log(
                Level::INFO,
                format!(
                    "Player pool: sampled {} of {} referenced players",
                    sampled, referenced
                ),
            );
            self.checkpoint();
        }

        if self.state.player_pool_work.is_drained() {
            return Ok(Step::Continue);
        }
        self.set_phase(Phase::PlayerPoolDiscovery);

        let page_size = self.config.crawler.page_size;
        let drain_every = self.config.crawler.save_frequency.max(1);

        while !self.state.player_pool_work.is_drained() {
            if self.stop.is_requested() {
                return Ok(Step::Paused);
            }

            let index = self.state.player_pool_work.cursor;
            let Some(player_id) = self.state.player_pool_work.id_at(index) else {
                break;
            };
            if self.state.player_pool_work.is_processed(player_id) {
                self.state.player_pool_work.advance_to(index + 1);
                continue;
            }

            let total = self.state.player_pool_work.len();
            self.observer.on_progress(
                index + 1,
                total,
                &format!("Battle list for player {}", player_id),
            );

            let list = self
                .api
                .fetch_battle_list(&player_id.to_string(), page_size)
                .await?;
            if let Some(list) = list.found() {
                let added = self.state.enqueue_arenas(list.arena_ids());
                tracing::debug!("Player {}: {} new arenas", player_id, added);
            }

            self.state.player_pool_work.mark_processed(player_id);
            self.state.player_pool_work.advance_to(index + 1);
            self.tick();

            if (index + 1) % drain_every == 0 && !self.state.arena_work.is_drained() {
                proceed!(self.drain_arenas().await?);
                self.set_phase(Phase::PlayerPoolDiscovery);
            }
        }

        Ok(Step::Continue)
    }

    async fn fetch_player_details(&mut self) -> Result<Step> {
        if !self.state.player_detail_work.built {
            if self.stop.is_requested() {
                return Ok(Step::Paused);
            }
            self.set_phase(Phase::PlayerDetails);
            let total = self.state.build_player_detail_queue();
            self.log(
                Level::INFO,
                format!("Fetching details for {} players", total),
            );
            self.checkpoint();
        }

        if self.state.player_detail_work.is_drained() {
            return Ok(Step::Continue);
        }
        self.set_phase(Phase::PlayerDetails);

        let concurrency = self.config.crawler.concurrency.max(1);
        let api = self.api.clone();

        while !self.state.player_detail_work.is_drained() {
            if self.stop.is_requested() {
                return Ok(Step::Paused);
            }

            let total = self.state.player_detail_work.len();
            let start = self.state.player_detail_work.cursor;
            let end = (start + concurrency).min(total);
            let batch: Vec<(usize, u64)> = (start..end)
                .filter_map(|i| self.state.player_detail_work.id_at(i).map(|id| (i, id)))
                .collect();
            let to_fetch: Vec<u64> = batch
                .iter()
                .map(|(_, id)| *id)
                .filter(|id| !self.state.player_detail_work.is_processed(*id))
                .collect();

            for (index, id) in &batch {
                if !self.state.player_detail_work.is_processed(*id) {
                    self.observer
                        .on_progress(index + 1, total, &format!("Player {}", id));
                }
            }

            let mut results = api.players(to_fetch, concurrency);
            for (index, id) in batch {
                if self.state.player_detail_work.is_processed(id) {
                    self.state.player_detail_work.advance_to(index + 1);
                    continue;
                }
                let Some((_, result)) = results.next().await else {
                    break;
                };

                match result?.found() {
                    Some(player) => self.state.players.push(player),
                    None => self.log(Level::WARN, format!("No details for player {}", id)),
                }
                self.state.player_detail_work.mark_processed(id);
                self.state.player_detail_work.advance_to(index + 1);
                self.tick();
            }
        }

        Ok(Step::Continue)
    }

    // ===== Checkpointing =====

    /// Counts one processed item and checkpoints every `save-frequency`
    fn tick(&mut self) {
        self.since_checkpoint += 1;
        if self.since_checkpoint >= self.config.crawler.save_frequency.max(1) {
            self.checkpoint();
        }
    }

    /// Hands snapshots to the persistence and export lanes without waiting
    fn checkpoint(&mut self) {
        self.since_checkpoint = 0;
        self.state.last_checkpoint = Utc::now();

        let snapshot = self.state.clone();
        let data = Arc::new(ExportData::from(&snapshot));
        self.store.save_async(snapshot);
        if self.config.output.auto_export {
            self.exporter.export_latest_async(Arc::clone(&data));
        }
        self.observer.on_data_collected(data);
    }

    /// Waits for both lanes, then writes the checkpoint synchronously
    async fn persist_now(&mut self) {
        self.store.flush().await;
        self.exporter.flush().await;

        self.state.last_checkpoint = Utc::now();
        if let Err(e) = self.store.save(&self.state) {
            self.log(Level::WARN, format!("Checkpoint write failed: {}", e));
        }
    }

    fn export_latest(&self, data: &ExportData) {
        if !self.config.output.auto_export {
            return;
        }
        if let Err(e) = self.exporter.export_latest(data) {
            tracing::warn!("Export failed: {}", e);
        }
    }

    // ===== Finalization =====

    async fn finalize(&mut self, result: Result<Step>) -> Result<CrawlOutcome> {
        match result {
            Ok(Step::Continue) => Ok(self.complete().await),
            Ok(Step::Paused) => Ok(self.pause().await),
            Err(e) if e.is_interrupted() => Ok(self.pause().await),
            Err(e) => Err(self.fail(e).await),
        }
    }

    async fn complete(&mut self) -> CrawlOutcome {
        self.set_phase(Phase::Completed);
        self.persist_now().await;

        let data = Arc::new(ExportData::from(&self.state));
        if self.config.output.auto_export {
            if let Err(e) = self.exporter.export_snapshot(&data) {
                tracing::warn!("Snapshot export failed: {}", e);
            }
        }
        self.export_latest(&data);

        self.log(
            Level::INFO,
            format!(
                "Crawl completed: {} battle details, {} players",
                data.battle_details.len(),
                data.players.len()
            ),
        );
        self.observer.on_complete(Arc::clone(&data));

        if self.config.crawler.clear_on_complete {
            if let Err(e) = self.store.clear() {
                tracing::warn!("Could not clear checkpoint: {}", e);
            }
        }

        CrawlOutcome::Completed(data)
    }

    async fn pause(&mut self) -> CrawlOutcome {
        self.set_phase(Phase::Paused);
        self.persist_now().await;

        let data = Arc::new(ExportData::from(&self.state));
        self.export_latest(&data);
        self.log(
            Level::INFO,
            format!("Crawl paused: {}", self.state.resume_summary()),
        );
        self.observer.on_data_collected(Arc::clone(&data));

        CrawlOutcome::Paused(data)
    }

    async fn fail(&mut self, error: CrawlerError) -> CrawlerError {
        self.set_phase(Phase::Error);
        self.persist_now().await;

        let data = ExportData::from(&self.state);
        self.export_latest(&data);
        self.log(
            Level::ERROR,
            format!(
                "Crawl stopped on error ({:?}): {}. {}",
                error.kind(),
                error,
                self.state.resume_summary()
            ),
        );
        self.observer.on_error(&error, true);

        error
    }

    // ===== Events =====

    fn set_phase(&mut self, phase: Phase) {
        if self.state.current_phase != phase {
            tracing::debug!("Phase {} -> {}", self.state.current_phase, phase);
            self.state.current_phase = phase;
            self.observer.on_phase_changed(phase);
        }
    }

    fn log(&self, level: Level, message: String) {
        match level {
            Level::ERROR => tracing::error!("{}", message),
            Level::WARN => tracing::warn!("{}", message),
            Level::INFO => tracing::info!("{}", message),
            Level::DEBUG => tracing::debug!("{}", message),
            _ => tracing::trace!("{}", message),
        }
        self.observer.on_log(level, &message);
    }
}

fn new_state(config: &Config) -> CrawlState {
    CrawlState::new(
        config.crawler.initial_player_id.clone(),
        config.crawler.max_players,
    )
}
