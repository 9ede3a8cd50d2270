//! Cancellation and timeout for catalog reads and DDL issuance.
//!
//! Cancelling drops the unit in flight, which rolls its transaction back.
//! Units committed earlier stay applied and a full re-run is the recovery
//! path.

use std::future::Future;
use std::time::Duration;

use errors::RetrofitError;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct StatementGuard {
    cancellation: CancellationToken,
    timeout: Option<Duration>,
}

impl StatementGuard {
    pub fn new(cancellation: CancellationToken, timeout: Option<Duration>) -> Self {
        Self {
            cancellation,
            timeout,
        }
    }

    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            cancellation: CancellationToken::new(),
            timeout,
        }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Fails fast when the run has already been cancelled.
    pub fn check(&self, operation: &str) -> Result<(), RetrofitError> {
        if self.cancellation.is_cancelled() {
            return Err(RetrofitError::Cancelled {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    /// Drives `future` to completion unless the token fires or the timeout
    /// elapses first.
    pub async fn run<T, F>(&self, operation: &str, future: F) -> Result<T, RetrofitError>
    where
        F: Future<Output = Result<T, RetrofitError>>,
    {
        self.check(operation)?;

        let bounded = async {
            match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, future).await {
                    Ok(result) => result,
                    Err(_) => Err(RetrofitError::TimedOut {
                        operation: operation.to_string(),
                        timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    }),
                },
                None => future.await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(RetrofitError::Cancelled {
                operation: operation.to_string(),
            }),
            result = bounded => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_result_through() {
        let guard = StatementGuard::default();
        let value = guard.run("read_tables", async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let guard = StatementGuard::new(token, None);

        let err = guard
            .run("add_tenant_column", async { Ok(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, RetrofitError::Cancelled { ref operation } if operation == "add_tenant_column"));
    }

    #[tokio::test]
    async fn test_cancelled_while_running() {
        let token = CancellationToken::new();
        let guard = StatementGuard::new(token.clone(), None);

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let err = guard
            .run("widen_unique_construct", async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        canceller.await.unwrap();
        assert!(matches!(err, RetrofitError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_timeout() {
        let guard = StatementGuard::with_timeout(Some(Duration::from_millis(10)));
        let err = guard
            .run("read_foreign_key_columns", async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RetrofitError::TimedOut { timeout_ms: 10, .. }));
    }
}
