use serde::Deserialize;

/// Main configuration structure for Battle-Crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Crawl traversal configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Player whose battle list seeds the crawl
    #[serde(rename = "initial-player-id")]
    pub initial_player_id: String,

    /// Maximum number of players sampled into the player pool
    #[serde(rename = "max-players", default = "default_max_players")]
    pub max_players: usize,

    /// Checkpoint every N processed items
    #[serde(rename = "save-frequency", default = "default_save_frequency")]
    pub save_frequency: usize,

    /// Battles requested per battle-list call (clamped to 1..=500 when used)
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    /// Number of detail fetches allowed in flight at once (1 = sequential)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Fixed seed for player pool sampling, random when absent
    #[serde(rename = "shuffle-seed", default)]
    pub shuffle_seed: Option<u64>,

    /// Delete the checkpoint once a crawl completes
    #[serde(rename = "clear-on-complete", default = "default_true")]
    pub clear_on_complete: bool,
}

/// HTTP adapter configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Root of the statistics API
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    /// Server region used for player lookups
    #[serde(default = "default_region")]
    pub region: String,

    /// Minimum spacing between request starts (milliseconds)
    #[serde(rename = "request-delay-ms", default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Connect and request timeout (seconds, floor of 5 applied at use)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Total attempts per request, including the first
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base of the exponential retry backoff (milliseconds)
    #[serde(rename = "retry-base-delay-ms", default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// User-Agent header sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory holding the checkpoint, its backup and staging files
    #[serde(rename = "data-dir", default = "default_data_dir")]
    pub data_dir: String,

    /// Directory receiving export artifacts
    #[serde(rename = "export-dir", default = "default_export_dir")]
    pub export_dir: String,

    /// Write partial and final exports while crawling
    #[serde(rename = "auto-export", default = "default_true")]
    pub auto_export: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            region: default_region(),
            request_delay_ms: default_request_delay_ms(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            export_dir: default_export_dir(),
            auto_export: true,
        }
    }
}

impl Config {
    /// Switches to the batch profile: wide fan-out and patient retries
    pub fn apply_batch_profile(&mut self) {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.crawler.concurrency = cpus.clamp(8, 64);
        self.http.max_attempts = BATCH_MAX_ATTEMPTS;
    }
}

/// Attempt cap used by the batch profile
pub const BATCH_MAX_ATTEMPTS: u32 = 1000;

fn default_max_players() -> usize {
    100
}

fn default_save_frequency() -> usize {
    5
}

fn default_page_size() -> u32 {
    50
}

fn default_concurrency() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "https://api.tomato.gg".to_string()
}

fn default_region() -> String {
    "eu".to_string()
}

fn default_request_delay_ms() -> u64 {
    500
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_user_agent() -> String {
    format!("battle-crawler/{}", env!("CARGO_PKG_VERSION"))
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_export_dir() -> String {
    "./data/exports".to_string()
}
