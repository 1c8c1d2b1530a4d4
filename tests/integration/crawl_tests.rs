//! Integration tests for the crawler
//!
//! These tests use wiremock to create a mock statistics API and test
//! the full crawl cycle end-to-end, including pause and resume.

use battle_crawler::config::{Config, CrawlerConfig, HttpConfig, OutputConfig};
use battle_crawler::crawler::{CrawlObserver, CrawlOutcome, Coordinator, StopSignal};
use battle_crawler::output::ExportData;
use battle_crawler::state::Phase;
use battle_crawler::storage::ProgressStore;
use serde_json::json;
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const SEED_PLAYER: u64 = 100;

/// Creates a test configuration pointing at the mock server
fn create_test_config(base_url: &str, dir: &TempDir, max_players: usize) -> Config {
    Config {
        crawler: CrawlerConfig {
            initial_player_id: SEED_PLAYER.to_string(),
            max_players,
            save_frequency: 2,
            page_size: 50,
            concurrency: 1,
            shuffle_seed: Some(7),
            clear_on_complete: true,
        },
        http: HttpConfig {
            base_url: base_url.to_string(),
            request_delay_ms: 0,
            retry_base_delay_ms: 10,
            max_attempts: 2,
            ..HttpConfig::default()
        },
        output: OutputConfig {
            data_dir: dir.path().join("data").display().to_string(),
            export_dir: dir.path().join("exports").display().to_string(),
            auto_export: true,
        },
    }
}

/// Mounts a player's battle list
async fn mount_battle_list(server: &MockServer, player: u64, arenas: &[u64]) {
    let data: Vec<_> = arenas
        .iter()
        .map(|a| json!({"arena_id": a.to_string(), "battle_time": "2024-01-01"}))
        .collect();
    Mock::given(method("GET"))
        .and(path(format!("/api/player/combined-battles/{}", player)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "meta": {"status": "ok"},
            "data": data
        })))
        .mount(server)
        .await;
}

/// Mounts a battle detail that must be fetched exactly once
async fn mount_battle_detail(server: &MockServer, arena: u64, players: &[u64]) {
    let roster: Vec<_> = players
        .iter()
        .map(|p| json!({"player_id": p, "username": format!("player{}", p)}))
        .collect();
    Mock::given(method("GET"))
        .and(path(format!("/api/player/battle-detail/{}", arena)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "general": {"arena_id": arena},
            "players": roster
        })))
        .expect(1)
        .mount(server)
        .await;
}

/// Answers every player lookup with a record echoing the requested id
struct EchoPlayer;

impl Respond for EchoPlayer {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let id = request
            .url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
            .to_string();
        ResponseTemplate::new(200).set_body_json(json!({"player_id": id, "battles": 1000}))
    }
}

async fn mount_players(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/player/overall/eu/\d+$"))
        .respond_with(EchoPlayer)
        .mount(server)
        .await;
}

/// Answers every battle list not mounted explicitly with the same arenas
async fn mount_default_battle_list(server: &MockServer, arenas: &[u64]) {
    let data: Vec<_> = arenas.iter().map(|a| json!({"arena_id": a.to_string()})).collect();
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/player/combined-battles/\d+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": data})))
        .mount(server)
        .await;
}

fn arena_ids(data: &ExportData) -> BTreeSet<u64> {
    data.battle_details
        .iter()
        .filter_map(|d| d.general.as_ref()?.get("arena_id")?.as_u64())
        .collect()
}

fn player_ids(data: &ExportData) -> BTreeSet<String> {
    data.players
        .iter()
        .filter_map(|p| p.0.get("player_id")?.as_str().map(str::to_string))
        .collect()
}

/// Stops the crawl the first time each working phase is entered
struct StopOnNewPhase {
    stop: Mutex<Option<StopSignal>>,
    seen: Mutex<HashSet<Phase>>,
}

impl StopOnNewPhase {
    fn new() -> Self {
        Self {
            stop: Mutex::new(None),
            seen: Mutex::new(HashSet::new()),
        }
    }

    fn attach(&self, stop: StopSignal) {
        *self.stop.lock().unwrap() = Some(stop);
    }
}

impl CrawlObserver for StopOnNewPhase {
    fn on_phase_changed(&self, phase: Phase) {
        if !phase.is_working() {
            return;
        }
        if self.seen.lock().unwrap().insert(phase) {
            if let Some(stop) = self.stop.lock().unwrap().as_ref() {
                stop.request_stop();
            }
        }
    }
}

/// Stops the crawl right before a given battle detail fetch
struct StopAtArenaProgress {
    stop: StopSignal,
    at: usize,
}

impl CrawlObserver for StopAtArenaProgress {
    fn on_progress(&self, current: usize, _total: usize, message: &str) {
        if message.starts_with("Battle detail") && current == self.at {
            self.stop.request_stop();
        }
    }
}

/// Mounts a small world: three seed arenas, a fourth arena found through
/// any pool player other than the seed, and player records for everyone
async fn mount_small_world(server: &MockServer) {
    mount_battle_list(server, SEED_PLAYER, &[1, 2, 3]).await;
    mount_default_battle_list(server, &[3, 4]).await;

    mount_battle_detail(server, 1, &[100, 201, 202]).await;
    mount_battle_detail(server, 2, &[100, 203]).await;
    mount_battle_detail(server, 3, &[201, 204]).await;
    mount_battle_detail(server, 4, &[205]).await;

    mount_players(server).await;
}

#[tokio::test]
async fn test_full_crawl() {
    let mock_server = MockServer::start().await;
    mount_small_world(&mock_server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir, 10);

    let mut coordinator = Coordinator::new(config, false).expect("Failed to create coordinator");
    let outcome = coordinator.run().await.expect("Crawl failed");

    let data = match outcome {
        CrawlOutcome::Completed(data) => data,
        other => panic!("Expected completion, got {:?}", other),
    };

    assert_eq!(arena_ids(&data), BTreeSet::from([1, 2, 3, 4]));
    assert_eq!(
        player_ids(&data),
        ["100", "201", "202", "203", "204", "205"]
            .into_iter()
            .map(String::from)
            .collect::<BTreeSet<String>>()
    );
    assert_eq!(data.combined_battles.as_ref().unwrap().data.len(), 3);
    assert_eq!(coordinator.state().current_phase, Phase::Completed);

    // Checkpoint is cleared on completion, exports remain
    assert!(!coordinator.store().exists());
    let exports = coordinator.exporter().list_exports().unwrap();
    assert!(exports.iter().any(|f| f.name == "export_latest.json"));
    assert!(exports.iter().any(|f| f.name.starts_with("export_data_")));
}

#[tokio::test]
async fn test_shared_arena_fetched_once() {
    let mock_server = MockServer::start().await;

    // Arena 2 is in the seed list and in two pool players' lists
    mount_battle_list(&mock_server, SEED_PLAYER, &[1, 2]).await;
    mount_battle_list(&mock_server, 201, &[2, 3]).await;
    mount_battle_list(&mock_server, 202, &[3, 2, 1]).await;

    mount_battle_detail(&mock_server, 1, &[100, 201]).await;
    mount_battle_detail(&mock_server, 2, &[100, 202]).await;
    mount_battle_detail(&mock_server, 3, &[201]).await;
    mount_players(&mock_server).await;

    let dir = TempDir::new().unwrap();
    let mut coordinator =
        Coordinator::new(create_test_config(&mock_server.uri(), &dir, 10), false).unwrap();
    let outcome = coordinator.run().await.unwrap();

    assert!(outcome.is_completed());
    assert_eq!(outcome.data().battle_details.len(), 3);
}

#[tokio::test]
async fn test_pause_and_resume_keeps_arena_cursor() {
    let mock_server = MockServer::start().await;

    let arenas: Vec<u64> = (1..=20).collect();
    mount_battle_list(&mock_server, SEED_PLAYER, &arenas).await;
    for arena in &arenas {
        mount_battle_detail(&mock_server, *arena, &[SEED_PLAYER]).await;
    }
    mount_players(&mock_server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir, 10);
    let data_dir = config.output.data_dir.clone();

    // First run: stop right before the 8th arena (index 7)
    let mut first = Coordinator::new(config.clone(), false).unwrap();
    first.set_observer(Arc::new(StopAtArenaProgress {
        stop: first.stop_signal(),
        at: 8,
    }));
    let outcome = first.run().await.unwrap();

    assert!(matches!(outcome, CrawlOutcome::Paused(_)));
    assert_eq!(first.state().arena_work.cursor, 7);
    assert_eq!(first.state().battle_details.len(), 7);

    let saved = ProgressStore::new(&data_dir).unwrap().load().unwrap();
    assert_eq!(saved.current_phase, Phase::Paused);
    assert_eq!(saved.arena_work.cursor, 7);
    assert_eq!(saved.arena_work.processed.len(), 7);

    // Second run resumes at index 7; every arena mock expects one hit
    let mut second = Coordinator::new(config, false).unwrap();
    assert!(second.is_resumed());
    assert_eq!(second.state().arena_work.cursor, 7);

    let outcome = second.run().await.unwrap();
    assert!(outcome.is_completed());
    assert_eq!(outcome.data().battle_details.len(), 20);
    assert_eq!(outcome.data().players.len(), 1);
}

#[tokio::test]
async fn test_interrupted_crawl_matches_uninterrupted_crawl() {
    let uninterrupted_server = MockServer::start().await;
    mount_small_world(&uninterrupted_server).await;
    let interrupted_server = MockServer::start().await;
    mount_small_world(&interrupted_server).await;

    // Sample 3 of the 6 referenced players in both runs
    let dir_a = TempDir::new().unwrap();
    let mut straight =
        Coordinator::new(create_test_config(&uninterrupted_server.uri(), &dir_a, 3), false)
            .unwrap();
    let expected = straight.run().await.unwrap();
    assert!(expected.is_completed());

    let dir_b = TempDir::new().unwrap();
    let config_b = create_test_config(&interrupted_server.uri(), &dir_b, 3);
    let observer = Arc::new(StopOnNewPhase::new());

    let mut pauses = 0;
    let actual = loop {
        let mut coordinator = Coordinator::new(config_b.clone(), false).unwrap();
        observer.attach(coordinator.stop_signal());
        coordinator.set_observer(observer.clone());

        match coordinator.run().await.unwrap() {
            CrawlOutcome::Completed(data) => break data,
            CrawlOutcome::Paused(_) => pauses += 1,
        }
        assert!(pauses < 10, "crawl did not converge");
    };

    assert!(pauses >= 4, "expected a pause per phase, got {}", pauses);
    assert_eq!(arena_ids(&actual), arena_ids(expected.data()));
    assert_eq!(player_ids(&actual), player_ids(expected.data()));
}

#[tokio::test]
async fn test_missing_seed_data_is_fatal() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("/api/player/combined-battles/{}", SEED_PLAYER)))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir, 10);
    let data_dir = config.output.data_dir.clone();

    let mut coordinator = Coordinator::new(config, false).unwrap();
    let err = coordinator.run().await.unwrap_err();

    assert!(err.to_string().contains("100"));
    assert_eq!(coordinator.state().current_phase, Phase::Error);

    let saved = ProgressStore::new(&data_dir).unwrap().load().unwrap();
    assert_eq!(saved.current_phase, Phase::Error);
}

#[tokio::test]
async fn test_pool_player_failure_resumes_on_that_player() {
    let mock_server = MockServer::start().await;

    mount_battle_list(&mock_server, SEED_PLAYER, &[1]).await;
    mount_battle_detail(&mock_server, 1, &[201]).await;
    Mock::given(method("GET"))
        .and(path("/api/player/combined-battles/201"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;
    mount_battle_list(&mock_server, 201, &[1]).await;
    mount_players(&mock_server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir, 10);
    let data_dir = config.output.data_dir.clone();

    let mut coordinator = Coordinator::new(config.clone(), false).unwrap();
    assert!(coordinator.run().await.is_err());

    let saved = ProgressStore::new(&data_dir).unwrap().load().unwrap();
    assert_eq!(saved.current_phase, Phase::Error);
    assert!(saved.player_pool_work.built);
    assert_eq!(saved.player_pool_work.cursor, 0);
    assert_eq!(saved.battle_details.len(), 1);

    let before = mock_server.received_requests().await.unwrap().len();

    // Resuming from ERROR retries player 201 first; arena 1 expects one hit
    let mut resumed = Coordinator::new(config, false).unwrap();
    assert!(resumed.is_resumed());
    assert_eq!(resumed.state().player_pool_work.cursor, 0);

    let outcome = resumed.run().await.unwrap();
    assert!(outcome.is_completed());
    assert_eq!(outcome.data().battle_details.len(), 1);
    assert_eq!(outcome.data().players.len(), 1);

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(
        requests[before].url.path(),
        "/api/player/combined-battles/201"
    );
    assert!(requests[before..]
        .iter()
        .all(|r| r.url.path() != "/api/player/battle-detail/1"));
}

#[tokio::test]
async fn test_non_retryable_statuses_skip_the_item() {
    let mock_server = MockServer::start().await;

    mount_battle_list(&mock_server, SEED_PLAYER, &[1]).await;
    mount_battle_detail(&mock_server, 1, &[201, 202]).await;
    mount_battle_detail(&mock_server, 2, &[203]).await;

    // 501 and 505 are outside the retry set: one request each, no retries
    Mock::given(method("GET"))
        .and(path("/api/player/combined-battles/201"))
        .respond_with(ResponseTemplate::new(501))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/player/overall/eu/203"))
        .respond_with(ResponseTemplate::new(505))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_default_battle_list(&mock_server, &[2]).await;
    mount_players(&mock_server).await;

    let dir = TempDir::new().unwrap();
    let mut coordinator =
        Coordinator::new(create_test_config(&mock_server.uri(), &dir, 10), false).unwrap();
    let outcome = coordinator.run().await.expect("Crawl should continue past skipped items");

    assert!(outcome.is_completed());
    assert_eq!(arena_ids(outcome.data()), BTreeSet::from([1, 2]));
    assert_eq!(
        player_ids(outcome.data()),
        ["201", "202"]
            .into_iter()
            .map(String::from)
            .collect::<BTreeSet<String>>()
    );
}

#[tokio::test]
async fn test_empty_battle_detail_is_fatal() {
    let mock_server = MockServer::start().await;

    mount_battle_list(&mock_server, SEED_PLAYER, &[1, 2, 3]).await;
    mount_battle_detail(&mock_server, 1, &[201]).await;
    Mock::given(method("GET"))
        .and(path("/api/player/battle-detail/2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/player/battle-detail/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"players": []})))
        .expect(0)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir, 10);
    let data_dir = config.output.data_dir.clone();

    let mut coordinator = Coordinator::new(config, false).unwrap();
    let err = coordinator.run().await.unwrap_err();
    assert!(err.to_string().contains("arena 2"));

    let saved = ProgressStore::new(&data_dir).unwrap().load().unwrap();
    assert_eq!(saved.current_phase, Phase::Error);
    assert_eq!(saved.arena_work.cursor, 1);
    assert!(!saved.arena_work.is_processed(2));
    assert_eq!(saved.battle_details.len(), 1);
}
