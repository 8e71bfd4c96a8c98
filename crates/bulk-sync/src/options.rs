//! Per-call options for bulk operations.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{BulkError, Result};

/// Rows per transfer chunk when the caller does not choose.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Options accepted by `bulk_insert`, `bulk_update` and `bulk_insert_or_update`.
#[derive(Debug, Clone)]
pub struct BulkOptions {
    /// Preserve explicit primary-key values instead of letting the database
    /// assign them. Only affects `bulk_insert`.
    pub keep_identity: bool,

    /// Rows per transfer chunk.
    pub batch_size: usize,

    /// Per-statement (and per-chunk) execution timeout.
    pub timeout: Option<Duration>,

    /// Log streaming progress every N rows. Defaults to `batch_size`.
    pub notify_after: Option<usize>,

    /// Cancels the operation; an in-flight call is abandoned and rolled back.
    pub cancel: CancellationToken,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            keep_identity: false,
            batch_size: DEFAULT_BATCH_SIZE,
            timeout: None,
            notify_after: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl BulkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keep_identity(mut self, keep: bool) -> Self {
        self.keep_identity = keep;
        self
    }

    pub fn batch_size(mut self, rows: usize) -> Self {
        self.batch_size = rows;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn notify_after(mut self, rows: usize) -> Self {
        self.notify_after = Some(rows);
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Chunk size with zero normalised to the default.
    pub fn effective_batch_size(&self) -> usize {
        if self.batch_size == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            self.batch_size
        }
    }

    /// Progress interval in rows.
    pub fn effective_notify_after(&self) -> usize {
        match self.notify_after {
            Some(n) if n > 0 => n,
            _ => self.effective_batch_size(),
        }
    }

    /// Fail fast if the token has already fired.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(BulkError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run a database future under this call's timeout only.
    ///
    /// Used for rollback and cleanup, which must still run after the token
    /// has fired.
    pub async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.timeout {
            Some(after) => tokio::time::timeout(after, fut)
                .await
                .map_err(|_| BulkError::Timeout {
                    operation: operation.to_string(),
                    after,
                })?,
            None => fut.await,
        }
    }

    /// Run a database future under this call's cancellation token and timeout.
    ///
    /// Cancellation wins over completion when both are ready. The future is
    /// dropped on cancel or timeout; callers must treat the session as dirty
    /// and roll back.
    pub async fn guard<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(BulkError::Cancelled),
            result = self.bounded(operation, fut) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = BulkOptions::default();
        assert!(!opts.keep_identity);
        assert_eq!(opts.batch_size, DEFAULT_BATCH_SIZE);
        assert!(opts.timeout.is_none());
        assert_eq!(opts.effective_notify_after(), DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn test_zero_batch_size_normalised() {
        let opts = BulkOptions::new().batch_size(0);
        assert_eq!(opts.effective_batch_size(), DEFAULT_BATCH_SIZE);

        let opts = BulkOptions::new().batch_size(500).notify_after(0);
        assert_eq!(opts.effective_batch_size(), 500);
        assert_eq!(opts.effective_notify_after(), 500);
    }

    #[tokio::test]
    async fn test_guard_passes_through_result() {
        let opts = BulkOptions::new();
        let value = opts.guard("noop", async { Ok(7u64) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_guard_times_out() {
        let opts = BulkOptions::new().timeout(Duration::from_millis(10));
        let err = opts
            .guard("slow statement", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();

        match err {
            BulkError::Timeout { operation, after } => {
                assert_eq!(operation, "slow statement");
                assert_eq!(after, Duration::from_millis(10));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_guard_observes_cancellation() {
        let token = CancellationToken::new();
        let opts = BulkOptions::new().cancel_token(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let err = opts
            .guard("copy", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, BulkError::Cancelled));
        assert!(opts.check_cancelled().is_err());
    }

    #[tokio::test]
    async fn test_bounded_ignores_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let opts = BulkOptions::new()
            .cancel_token(token)
            .timeout(Duration::from_secs(5));

        let value = opts.bounded("rollback", async { Ok(3u8) }).await.unwrap();
        assert_eq!(value, 3);
        assert!(opts.guard("copy", async { Ok(3u8) }).await.is_err());
    }
}
