//! Database query timeout helpers
//!
//! Provides timeout wrappers for database operations to prevent indefinite hangs.

use std::time::Duration;
use tokio::time::timeout;

use super::errors::{StorageError, StorageResult};

/// Default timeout for database queries (5 seconds)
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for listing sweeps over many sessions (30 seconds)
pub const LONG_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Execute a query with timeout
///
/// # Arguments
///
/// * `duration` - Timeout duration
/// * `future` - Async operation to execute
///
/// # Returns
///
/// * `StorageResult<T>` - Result, database error, or timeout error
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> StorageResult<T>
where
    F: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    match timeout(duration, future).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(StorageError::Database(e)),
        Err(_) => Err(StorageError::Timeout(duration)),
    }
}

/// Execute a query with default timeout (5 seconds)
pub async fn with_default_timeout<F, T>(future: F) -> StorageResult<T>
where
    F: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    with_timeout(DEFAULT_QUERY_TIMEOUT, future).await
}

/// Execute a long-running query with extended timeout (30 seconds)
pub async fn with_long_timeout<F, T>(future: F) -> StorageResult<T>
where
    F: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    with_timeout(LONG_OPERATION_TIMEOUT, future).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_error_display() {
        let err = StorageError::Timeout(Duration::from_secs(5));
        assert!(err.to_string().contains("timed out"));
        assert!(err.to_string().contains("5s"));
    }

    #[tokio::test]
    async fn test_slow_future_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, sqlx::Error>(1)
        };
        let result = with_timeout(Duration::from_millis(10), slow).await;
        assert!(matches!(result, Err(StorageError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_fast_future_passes_through() {
        let result = with_default_timeout(async { Ok::<_, sqlx::Error>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
