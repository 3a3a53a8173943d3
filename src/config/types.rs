use serde::Deserialize;

use crate::feed::recency::RecencyWindow;

/// Environment variable that overrides `[api] token`.
pub const TOKEN_ENV: &str = "MODFEED_TOKEN";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub feed: FeedConfig,
    pub names: NamesConfig,
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_owned(),
            token: None,
            timeout_secs: 10,
        }
    }
}

impl ApiConfig {
    /// Bearer token: `$MODFEED_TOKEN` wins over the file.
    pub fn resolved_token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.token.clone().filter(|t| !t.is_empty()))
    }
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub guild_id: Option<String>,
    pub poll_interval_secs: u64,
    /// Number of most-recent events fetched by each head poll.
    pub head_window: u32,
    /// Idle gap after which a resume marker is inserted.
    pub long_pause_secs: u64,
    pub recency_window: RecencyWindow,
    pub per_page: u32,
    pub date_format: String,
    pub toast_ms: u64,
    pub flash_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            guild_id: None,
            poll_interval_secs: 10,
            head_window: 5,
            long_pause_secs: 120,
            recency_window: RecencyWindow::Day,
            per_page: 50,
            date_format: "%Y-%m-%d".to_owned(),
            toast_ms: 2200,
            flash_ms: 1500,
        }
    }
}

// ---------------------------------------------------------------------------
// Name resolution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NamesConfig {
    pub debounce_ms: u64,
    /// Maximum ids per lookup round trip, per kind.
    pub batch_cap: usize,
}

impl Default for NamesConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 250,
            batch_cap: 50,
        }
    }
}
