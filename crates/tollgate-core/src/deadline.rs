//! Deadlines for calls into the persistent store.

use std::time::Duration;

use tracing::warn;

use crate::error::{TollgateError, TollgateResult};

/// Run `fut` with a deadline. Elapsing maps to
/// [`TollgateError::StoreTimeout`] naming `operation`.
pub async fn with_deadline<T, F>(
    operation: &'static str,
    limit: Duration,
    fut: F,
) -> TollgateResult<T>
where
    F: Future<Output = TollgateResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                operation,
                timeout_ms = limit.as_millis() as u64,
                "Store call timed out"
            );
            Err(TollgateError::StoreTimeout { operation })
        }
    }
}
