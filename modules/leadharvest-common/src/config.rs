use std::env;
use std::time::Duration;

use tracing::info;

/// Application configuration loaded from environment variables.
/// CLI flags in the crawler binary override individual fields.
#[derive(Debug, Clone)]
pub struct Config {
    /// WebDriver endpoint (chromedriver or a Selenium-compatible hub).
    pub webdriver_url: String,
    /// Run the browser headless.
    pub headless: bool,

    /// Number of concurrent workers, each owning one renderer session.
    pub workers: usize,
    /// Seconds of startup stagger per worker ordinal.
    pub worker_stagger: Duration,

    /// Flush the in-memory batch to the store every N leads.
    pub save_every: usize,

    /// Per-card pacing window after a successful extraction.
    pub card_delay_min: Duration,
    pub card_delay_max: Duration,
    /// Randomized cooldown window between queries.
    pub query_cooldown: (Duration, Duration),
    /// Randomized cooldown window after a renderer crash.
    pub crash_cooldown: (Duration, Duration),

    /// Directory for per-worker partition files and the merged dataset.
    pub output_dir: String,
    /// File name of the final merged dataset.
    pub output_file: String,

    /// Placeholder/support numbers rejected during phone normalization.
    pub blocked_numbers: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            webdriver_url: env::var("WEBDRIVER_URL")
                .unwrap_or_else(|_| "http://localhost:9515".to_string()),
            headless: env_bool("HEADLESS", true),
            workers: env_parse("WORKERS", 3),
            worker_stagger: Duration::from_secs(env_parse("WORKER_STAGGER_SECS", 5)),
            save_every: env_parse("SAVE_EVERY", 20),
            card_delay_min: Duration::from_millis(env_parse("CARD_DELAY_MIN_MS", 800)),
            card_delay_max: Duration::from_millis(env_parse("CARD_DELAY_MAX_MS", 1600)),
            query_cooldown: (
                Duration::from_secs(env_parse("QUERY_COOLDOWN_MIN_SECS", 5)),
                Duration::from_secs(env_parse("QUERY_COOLDOWN_MAX_SECS", 10)),
            ),
            crash_cooldown: (
                Duration::from_secs(env_parse("CRASH_COOLDOWN_MIN_SECS", 15)),
                Duration::from_secs(env_parse("CRASH_COOLDOWN_MAX_SECS", 25)),
            ),
            output_dir: env::var("OUTPUT_DIR").unwrap_or_else(|_| "output".to_string()),
            output_file: env::var("OUTPUT_FILE").unwrap_or_else(|_| "leads.csv".to_string()),
            blocked_numbers: env::var("BLOCKED_NUMBERS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    pub fn log_summary(&self) {
        info!(
            webdriver_url = self.webdriver_url.as_str(),
            workers = self.workers,
            headless = self.headless,
            save_every = self.save_every,
            output_dir = self.output_dir.as_str(),
            output_file = self.output_file.as_str(),
            "Configuration loaded"
        );
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
