/// Resilience helpers for calls to the hosted backend
///
/// This library provides the patterns the ShareBook client wraps around network calls:
/// - **Timeout**: bounds every request so a stalled transport surfaces as an error
/// - **Retry**: exponential backoff with jitter, gated by a caller-supplied predicate so only
///   transient failures are retried
/// - **Presets**: tuned settings for table reads, table writes, storage transfers and
///   realtime reconnects
///
/// # Example: retrying an idempotent read
///
/// ```rust,no_run
/// use resilience::{presets, with_retry_if};
///
/// #[tokio::main]
/// async fn main() {
///     let config = presets::rest_read_config();
///
///     let result = with_retry_if(
///         config.retry.unwrap_or_default(),
///         |err: &String| err.starts_with("transient"),
///         || async { Ok::<_, String>(()) },
///     )
///     .await;
///     assert!(result.is_ok());
/// }
/// ```

pub mod presets;
pub mod retry;
pub mod timeout;

pub use presets::{
    realtime_reconnect_config, rest_read_config, rest_write_config, storage_config,
    ServiceConfig,
};
pub use retry::{with_retry, with_retry_if, RetryConfig};
pub use timeout::{with_timeout_or, TimeoutConfig};
