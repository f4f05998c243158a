//! # Operation Deadlines
//!
//! Every store operation runs under a deadline.
//!
//! ```text
//! repository call
//!      │
//!      ▼
//! Deadline::run("complete_ride", fut)
//!      │
//!      ├── fut finishes in time ──► its own DbResult
//!      │
//!      └── deadline elapses ──► fut is dropped
//!                                │
//!                                ├── open sqlx::Transaction drops → ROLLBACK
//!                                └── Err(DbError::Timeout)   (transient)
//! ```
//!
//! Dropping the returned future early (caller-side cancellation) has the same
//! effect as an elapsed deadline: nothing that was not committed survives.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{DbError, DbResult};

/// Default per-operation deadline.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on how long one store operation may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    limit: Duration,
}

impl Deadline {
    pub const fn new(limit: Duration) -> Self {
        Deadline { limit }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Runs `fut`, giving up after the limit.
    pub async fn run<T, F>(&self, operation: &'static str, fut: F) -> DbResult<T>
    where
        F: Future<Output = DbResult<T>>,
    {
        match tokio::time::timeout(self.limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, limit = ?self.limit, "Operation deadline elapsed, rolled back");
                Err(DbError::Timeout {
                    operation,
                    elapsed: self.limit,
                })
            }
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Deadline::new(DEFAULT_OPERATION_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_result_passes_through() {
        let deadline = Deadline::new(Duration::from_secs(1));
        let value = deadline.run("noop", async { Ok::<_, DbError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_elapsed_deadline_is_transient_timeout() {
        let deadline = Deadline::new(Duration::from_millis(10));
        let err = deadline
            .run("slow", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, DbError>(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Timeout { operation: "slow", .. }));
        assert!(err.is_transient());
    }
}
