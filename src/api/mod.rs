//! Domain fetchers for the statistics API
//!
//! Each fetcher pairs a URL template with a response type and goes through
//! the shared [`ApiClient`]. A response outside the retry set comes back as
//! [`Lookup::Skipped`] and an empty 2xx body as [`Lookup::Empty`]; every other
//! adapter failure is passed through unchanged.

mod models;

pub use models::{parse_id, BattleDetail, BattleList, BattlePlayer, BattleSummary, PlayerDetail};

use crate::fetch::{is_retryable_status, ApiClient, FetchError, FetchResult};
use futures::stream::{self, Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use url::Url;

/// Largest page size the battle-list endpoint accepts
pub const MAX_PAGE_SIZE: u32 = 500;

/// Look-back window requested from the battle-list endpoint
const BATTLE_LIST_DAYS: u32 = 36500;

/// What a fetcher got back from the server
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    /// 2xx with an empty or `null` body
    Empty,
    /// Status outside the retry set; the item has no data
    Skipped { status: u16 },
}

impl<T> Lookup<T> {
    /// The record, if one was returned
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// Typed access to the three endpoints the crawl uses
#[derive(Debug, Clone)]
pub struct StatsApi {
    client: Arc<ApiClient>,
    base_url: Url,
    region: String,
}

impl StatsApi {
    /// Creates the fetchers
    ///
    /// # Arguments
    ///
    /// * `client` - Shared HTTP adapter
    /// * `base_url` - API root, e.g. `https://api.tomato.gg`
    /// * `region` - Server region for player lookups
    pub fn new(client: Arc<ApiClient>, base_url: Url, region: impl Into<String>) -> Self {
        Self {
            client,
            base_url,
            region: region.into(),
        }
    }

    /// URL of a player's most recent battles
    pub fn battle_list_url(&self, player_id: &str, page_size: u32) -> String {
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let mut url = self.endpoint(&["api", "player", "combined-battles", player_id]);
        url.query_pairs_mut()
            .append_pair("page", "0")
            .append_pair("days", &BATTLE_LIST_DAYS.to_string())
            .append_pair("pageSize", &page_size.to_string())
            .append_pair("sortBy", "battle_time")
            .append_pair("sortDirection", "desc")
            .append_pair("platoon", "in-and-outside-platoon")
            .append_pair("spawn", "all")
            .append_pair("won", "all")
            .append_pair("classes", "")
            .append_pair("nations", "")
            .append_pair("roles", "")
            .append_pair("tiers", "")
            .append_pair("tankType", "all");
        url.to_string()
    }

    pub fn battle_detail_url(&self, arena_id: u64) -> String {
        self.endpoint(&["api", "player", "battle-detail", &arena_id.to_string()])
            .to_string()
    }

    pub fn player_url(&self, player_id: u64) -> String {
        self.endpoint(&["api", "player", "overall", &self.region, &player_id.to_string()])
            .to_string()
    }

    /// Fetches the most recent `page_size` battles of a player
    ///
    /// This is a single page, not a full-history walk.
    pub async fn fetch_battle_list(
        &self,
        player_id: &str,
        page_size: u32,
    ) -> FetchResult<Lookup<BattleList>> {
        let url = self.battle_list_url(player_id, page_size);
        self.lookup(&url).await
    }

    /// Fetches the full record of one battle
    pub async fn fetch_battle_detail(&self, arena_id: u64) -> FetchResult<Lookup<BattleDetail>> {
        let url = self.battle_detail_url(arena_id);
        self.lookup(&url).await
    }

    /// Fetches the overall statistics of one player
    pub async fn fetch_player(&self, player_id: u64) -> FetchResult<Lookup<PlayerDetail>> {
        let url = self.player_url(player_id);
        self.lookup(&url).await
    }

    /// Fetches many battle details with at most `concurrency` in flight
    ///
    /// Results are yielded in input order. Dropping the stream cancels any
    /// fetch not yet yielded.
    pub fn battle_details(
        &self,
        arena_ids: Vec<u64>,
        concurrency: usize,
    ) -> impl Stream<Item = (u64, FetchResult<Lookup<BattleDetail>>)> + '_ {
        stream::iter(arena_ids)
            .map(move |id| async move { (id, self.fetch_battle_detail(id).await) })
            .buffered(concurrency.max(1))
    }

    /// Fetches many player records with at most `concurrency` in flight
    pub fn players(
        &self,
        player_ids: Vec<u64>,
        concurrency: usize,
    ) -> impl Stream<Item = (u64, FetchResult<Lookup<PlayerDetail>>)> + '_ {
        stream::iter(player_ids)
            .map(move |id| async move { (id, self.fetch_player(id).await) })
            .buffered(concurrency.max(1))
    }

    async fn lookup<T: DeserializeOwned>(&self, url: &str) -> FetchResult<Lookup<T>> {
        match self.client.get_json(url).await {
            Ok(Some(value)) => Ok(Lookup::Found(value)),
            Ok(None) => Ok(Lookup::Empty),
            Err(e @ FetchError::Status { status, .. }) if !is_retryable_status(status) => {
                tracing::warn!("No data for {}: {}", url, e);
                Ok(Lookup::Skipped { status })
            }
            Err(e) => Err(e),
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}
