//! Progress-callback trait for batch-level classification events.
//!
//! Inject an [`Arc<dyn ProcessProgressCallback>`] via
//! [`crate::config::ClassifyConfigBuilder::progress_callback`] to receive
//! real-time events as the pipeline processes each batch.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers
//! can forward events to a Tokio broadcast channel, a WebSocket, a database
//! record, or a terminal progress bar — without the library knowing anything
//! about how the host application communicates. The trait is `Send + Sync`
//! so it works correctly when batches are processed concurrently.

/// Called by the classification pipeline as it processes each batch.
///
/// Implementations must be `Send + Sync` (batches are issued concurrently).
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// `on_batch_start`, `on_batch_complete`, and `on_batch_error` may be called
/// concurrently from different tasks. Implementations must protect shared
/// mutable state with appropriate synchronisation primitives.
pub trait ProcessProgressCallback: Send + Sync {
    /// Called once before any batch is sent, with the batch count.
    fn on_run_start(&self, total_batches: usize, total_rows: usize) {
        let _ = (total_batches, total_rows);
    }

    /// Called just before a batch request is sent.
    ///
    /// `batch_index` is 0-based; `rows` is the entry count in the batch.
    fn on_batch_start(&self, batch_index: usize, total_batches: usize, rows: usize) {
        let _ = (batch_index, total_batches, rows);
    }

    /// Called when a batch is successfully classified.
    fn on_batch_complete(&self, batch_index: usize, total_batches: usize, rows: usize) {
        let _ = (batch_index, total_batches, rows);
    }

    /// Called when a batch fails after all retries.
    fn on_batch_error(&self, batch_index: usize, total_batches: usize, error: &str) {
        let _ = (batch_index, total_batches, error);
    }

    /// Called once after the last batch settles.
    fn on_run_complete(&self, total_batches: usize, succeeded: usize) {
        let _ = (total_batches, succeeded);
    }
}
