//! Batch executor for label patches.
//!
//! One executor belongs to one labeling session (a single on-demand event for
//! one plugin, or one sweep of a project and plugin). It is not shared
//! between sessions and is not flushed on drop: callers must call
//! [`BatchExecutor::flush`] when the session ends.

use std::sync::Arc;

use labeler_cloud::{BatchResult, PatchOperation, PendingPatch, ResourceProvider};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Pending operations that trigger an automatic flush.
pub const DEFAULT_BATCH_THRESHOLD: usize = 1000;

/// Counters of one executor over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Operations handed to [`BatchExecutor::add`].
    pub enqueued: usize,
    /// Batched calls executed (including failed ones).
    pub flushes: usize,
    /// Operations the API accepted.
    pub succeeded: usize,
    /// Operations rejected individually or lost with a failed batch call.
    pub failed: usize,
}

/// Accumulates patch operations and sends them as one batched call.
pub struct BatchExecutor {
    provider: Arc<dyn ResourceProvider>,
    pending: Vec<PendingPatch>,
    threshold: usize,
    stats: BatchStats,
}

impl BatchExecutor {
    /// Create an executor flushing every [`DEFAULT_BATCH_THRESHOLD`] operations.
    #[must_use]
    pub fn new(provider: Arc<dyn ResourceProvider>) -> Self {
        Self::with_threshold(provider, DEFAULT_BATCH_THRESHOLD)
    }

    /// Create an executor with a custom flush threshold (at least 1).
    #[must_use]
    pub fn with_threshold(provider: Arc<dyn ResourceProvider>, threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            provider,
            pending: Vec::with_capacity(threshold),
            threshold,
            stats: BatchStats::default(),
        }
    }

    /// Generate a fresh idempotency token.
    #[must_use]
    pub fn new_token() -> String {
        Uuid::new_v4().to_string()
    }

    /// Number of operations waiting for the next flush.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Lifetime counters.
    #[must_use]
    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    /// Enqueue `operation` and flush if the threshold is reached.
    pub async fn add(&mut self, operation: PatchOperation, idempotency_token: String) {
        debug!(
            resource = %operation.resource_key,
            token = %idempotency_token,
            "Enqueued label patch"
        );
        self.pending.push(PendingPatch {
            operation,
            idempotency_token,
        });
        self.stats.enqueued += 1;

        if self.pending.len() >= self.threshold {
            self.flush().await;
        }
    }

    /// Enqueue `operation` under a freshly generated token.
    pub async fn add_operation(&mut self, operation: PatchOperation) {
        self.add(operation, Self::new_token()).await;
    }

    /// Execute every pending operation as one batched call.
    ///
    /// The pending batch is cleared whether or not the call succeeds; a
    /// failed call is logged and counted, never retried here.
    pub async fn flush(&mut self) -> BatchResult {
        if self.pending.is_empty() {
            return BatchResult::default();
        }

        let batch = std::mem::take(&mut self.pending);
        self.stats.flushes += 1;

        match self.provider.execute_batch(&batch).await {
            Ok(result) => {
                self.stats.succeeded += result.succeeded;
                self.stats.failed += result.failed.len();
                info!(
                    kind = %self.provider.kind(),
                    operations = batch.len(),
                    succeeded = result.succeeded,
                    failed = result.failed.len(),
                    "Flushed label batch"
                );
                result
            }
            Err(e) => {
                self.stats.failed += batch.len();
                error!(
                    kind = %self.provider.kind(),
                    operations = batch.len(),
                    error = %e,
                    "Label batch failed"
                );
                BatchResult::default()
            }
        }
    }
}

impl std::fmt::Debug for BatchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchExecutor")
            .field("kind", &self.provider.kind())
            .field("pending", &self.pending.len())
            .field("threshold", &self.threshold)
            .field("stats", &self.stats)
            .finish()
    }
}
