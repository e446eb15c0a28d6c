use std::cmp;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// Caps how many requests may be issued per sliding window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    pub max_requests: NonZeroUsize,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

fn default_max_requests() -> NonZeroUsize {
    NonZeroUsize::new(30).unwrap()
}

fn default_window_secs() -> u64 {
    60
}

/// Extra pause inserted before every Nth index page.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breather {
    pub every: NonZeroUsize,
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// When set, requests carry browser-like headers and a bearer
    /// `Authorization` header.
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// Raw `Cookie` header value attached to every request.
    #[serde(default)]
    pub cookies: Option<String>,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default = "default_page_buffer")]
    pub page_buffer: usize,
    #[serde(default = "default_concurrent_downloads")]
    pub concurrent_downloads: usize,
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    #[serde(default = "default_rate_limit")]
    pub rate_limit: Option<RateLimit>,
    /// Fixed politeness delay before each request, in milliseconds.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default)]
    pub breather: Option<Breather>,
    /// Pause after a retryable error or a blocking signal.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Pause after a request is abandoned for good.
    #[serde(default = "default_failure_cooldown_ms")]
    pub failure_cooldown_ms: u64,
    /// Retries per request on top of the initial attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_handle_sigint")]
    pub handle_sigint: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            bearer_token: None,
            cookies: None,
            proxy: None,
            page_buffer: default_page_buffer(),
            concurrent_downloads: default_concurrent_downloads(),
            num_workers: default_num_workers(),
            rate_limit: default_rate_limit(),
            request_delay_ms: default_request_delay_ms(),
            breather: None,
            cooldown_ms: default_cooldown_ms(),
            failure_cooldown_ms: default_failure_cooldown_ms(),
            max_retries: default_max_retries(),
            request_timeout_secs: default_request_timeout_secs(),
            handle_sigint: default_handle_sigint(),
        }
    }
}

fn default_user_agent() -> String {
    String::from(
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    )
}

fn default_page_buffer() -> usize {
    10_000
}

fn default_concurrent_downloads() -> usize {
    2
}

fn default_num_workers() -> usize {
    cmp::max(1, num_cpus::get().saturating_sub(2))
}

fn default_rate_limit() -> Option<RateLimit> {
    Some(RateLimit::default())
}

fn default_request_delay_ms() -> u64 {
    1_000
}

fn default_cooldown_ms() -> u64 {
    3_000
}

fn default_failure_cooldown_ms() -> u64 {
    5_000
}

fn default_max_retries() -> usize {
    2
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_handle_sigint() -> bool {
    true
}
