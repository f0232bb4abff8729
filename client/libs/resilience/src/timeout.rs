/// Timeout wrapper for async operations
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub duration: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(15),
        }
    }
}

/// Execute a fallible future with timeout, mapping expiry into the caller's error type
pub async fn with_timeout_or<F, T, E, M>(duration: Duration, future: F, on_elapsed: M) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    M: FnOnce(Duration) -> E,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(on_elapsed(duration)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_or_returns_value() {
        let result = with_timeout_or(
            Duration::from_secs(1),
            async { Ok::<_, String>(42) },
            |d| format!("elapsed {:?}", d),
        )
        .await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_timeout_or_passes_inner_error_through() {
        let result = with_timeout_or(
            Duration::from_secs(1),
            async { Err::<i32, _>("rejected".to_string()) },
            |d| format!("elapsed {:?}", d),
        )
        .await;

        assert_eq!(result.unwrap_err(), "rejected");
    }

    #[tokio::test]
    async fn test_timeout_or_maps_expiry() {
        let result = with_timeout_or(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<i32, String>(1)
            },
            |_| "timed out".to_string(),
        )
        .await;

        assert_eq!(result.unwrap_err(), "timed out");
    }
}
