use serde::Deserialize;
use std::time::Duration;

/// Browser-like agent string; the registry serves its forms to browsers only
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Main configuration structure for Presale-Crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub registry: RegistryConfig,
    pub crawler: CrawlerConfig,
    pub output: OutputConfig,
}

/// Origin registry site configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the registry site (e.g., "http://www.cszjxx.net")
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Region code submitted with the verification form
    #[serde(rename = "region-code")]
    pub region_code: String,

    /// User agent sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Crawl pacing and retry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Fixed delay between consecutive registry requests (milliseconds)
    #[serde(rename = "request-delay-ms")]
    pub request_delay_ms: u64,

    /// Number of retry passes over failed buildings
    #[serde(rename = "max-retry-passes", default = "default_retry_passes")]
    pub max_retry_passes: u32,

    /// Wait before a retry pass starts (milliseconds); never shorter than the request delay
    #[serde(rename = "retry-backoff-ms", default)]
    pub retry_backoff_ms: Option<u64>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl RegistryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Joins a path onto the base URL without doubling slashes
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl CrawlerConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        let backoff = self.retry_backoff_ms.unwrap_or(self.request_delay_ms);
        Duration::from_millis(backoff.max(self.request_delay_ms))
    }
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retry_passes() -> u32 {
    1
}
