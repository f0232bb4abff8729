/// Preset configurations for the kinds of backend calls the client makes
use crate::retry::RetryConfig;
use crate::timeout::TimeoutConfig;
use std::time::Duration;

/// Configuration bundle for a call type
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub timeout: TimeoutConfig,
    pub retry: Option<RetryConfig>,
}

/// Table reads (paged posts, single rows, notification lists)
///
/// - Timeout: 15s
/// - Retry: 2 attempts, reads are idempotent
pub fn rest_read_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(15),
        },
        retry: Some(RetryConfig {
            max_retries: 2,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter: true,
        }),
    }
}

/// Table writes (inserts, upserts, deletes)
///
/// - Timeout: 15s
/// - No retry (a lost response may still have committed the write)
pub fn rest_write_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(15),
        },
        retry: None,
    }
}

/// Media uploads and downloads
///
/// - Timeout: 120s (video files)
/// - No retry for uploads; callers opt in for downloads
pub fn storage_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(120),
        },
        retry: None,
    }
}

/// Realtime websocket reconnects
///
/// - Timeout: 10s per connect attempt
/// - Retry: 5 attempts, backoff capped at 30s
pub fn realtime_reconnect_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(10),
        },
        retry: Some(RetryConfig {
            max_retries: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }),
    }
}
