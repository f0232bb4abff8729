/// Configuration management for the ShareBook sync client
///
/// Loads configuration from environment variables (and a `.env` file when present).
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::sync::EndOfDataPolicy;

/// Main client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Hosted backend endpoints and keys
    pub backend: BackendConfig,
    /// Feed paging behaviour
    pub feed: FeedConfig,
    /// Realtime channel settings
    pub realtime: RealtimeConfig,
    /// Session refresh settings
    pub auth: AuthConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (development, staging, production)
    pub env: String,
    /// Log output format ("json" or "text")
    pub log_format: String,
}

/// Backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Project base URL, e.g. https://xyz.supabase.co
    pub url: String,
    /// Public anon key sent as `apikey`
    pub anon_key: String,
    /// Storage bucket holding post media and avatars
    #[serde(default = "default_storage_bucket")]
    pub storage_bucket: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Retries for idempotent reads
    #[serde(default = "default_http_max_retries")]
    pub http_max_retries: u32,
}

/// Feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub end_of_data: EndOfDataPolicy,
}

/// Realtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

/// Session refresh configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// How often the session's expiry is checked
    #[serde(default = "default_refresh_check_secs")]
    pub refresh_check_secs: u64,
    /// Refresh once the access token expires within this many seconds
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: i64,
}

// Default values
fn default_storage_bucket() -> String {
    "uploads".to_string()
}

fn default_http_timeout_secs() -> u64 {
    15
}

fn default_http_max_retries() -> u32 {
    2
}

fn default_page_size() -> usize {
    5
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn default_refresh_check_secs() -> u64 {
    30
}

fn default_refresh_margin_secs() -> i64 {
    60
}

impl BackendConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Websocket endpoint of the realtime service
    pub fn realtime_url(&self) -> String {
        let base = self.url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}/realtime/v1/websocket", ws_base)
    }
}

impl RealtimeConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

impl AuthConfig {
    pub fn refresh_check_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_check_secs.max(1))
    }

    pub fn refresh_margin(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_margin_secs)
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            log_format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()),
        };

        let backend = BackendConfig {
            url: std::env::var("SHAREBOOK_BACKEND_URL")
                .context("SHAREBOOK_BACKEND_URL environment variable not set")?,
            anon_key: std::env::var("SHAREBOOK_ANON_KEY")
                .context("SHAREBOOK_ANON_KEY environment variable not set")?,
            storage_bucket: std::env::var("SHAREBOOK_STORAGE_BUCKET")
                .unwrap_or_else(|_| default_storage_bucket()),
            http_timeout_secs: std::env::var("SHAREBOOK_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_http_timeout_secs),
            http_max_retries: std::env::var("SHAREBOOK_HTTP_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_http_max_retries),
        };

        let end_of_data = match std::env::var("SHAREBOOK_END_OF_DATA") {
            Ok(raw) => raw
                .parse::<EndOfDataPolicy>()
                .map_err(|e| anyhow::anyhow!(e))
                .context("SHAREBOOK_END_OF_DATA must be short_page or empty_page")?,
            Err(_) => EndOfDataPolicy::default(),
        };

        let feed = FeedConfig {
            page_size: std::env::var("SHAREBOOK_PAGE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_page_size),
            end_of_data,
        };
        if feed.page_size == 0 {
            bail!("SHAREBOOK_PAGE_SIZE must be greater than zero");
        }

        let realtime = RealtimeConfig {
            heartbeat_secs: std::env::var("SHAREBOOK_REALTIME_HEARTBEAT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_heartbeat_secs),
        };

        let auth = AuthConfig {
            refresh_check_secs: std::env::var("SHAREBOOK_REFRESH_CHECK_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_refresh_check_secs),
            refresh_margin_secs: std::env::var("SHAREBOOK_REFRESH_MARGIN_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_refresh_margin_secs),
        };

        Ok(Config {
            app,
            backend,
            feed,
            realtime,
            auth,
        })
    }

    /// Configuration pointing at a local backend, used by tests and examples
    pub fn local(url: &str, anon_key: &str) -> Self {
        Config {
            app: AppConfig {
                env: "development".to_string(),
                log_format: "text".to_string(),
            },
            backend: BackendConfig {
                url: url.to_string(),
                anon_key: anon_key.to_string(),
                storage_bucket: default_storage_bucket(),
                http_timeout_secs: default_http_timeout_secs(),
                http_max_retries: default_http_max_retries(),
            },
            feed: FeedConfig {
                page_size: default_page_size(),
                end_of_data: EndOfDataPolicy::default(),
            },
            realtime: RealtimeConfig {
                heartbeat_secs: default_heartbeat_secs(),
            },
            auth: AuthConfig {
                refresh_check_secs: default_refresh_check_secs(),
                refresh_margin_secs: default_refresh_margin_secs(),
            },
        }
    }
}
