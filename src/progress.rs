//! Progress-callback trait for per-file batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::ScorerConfigBuilder::progress_callback`] to observe a
//! batch as it runs: a terminal progress bar, a log line per file, or a
//! message to a websocket. The library knows nothing about the sink.
//!
//! # Example
//!
//! ```rust
//! use datadon_scorer::{BatchProgressCallback, ScorerConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl BatchProgressCallback for Counter {
//!     fn on_file_complete(&self, position: usize, total: usize, points: u8) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("file {position}/{total}: {points} points");
//!     }
//! }
//!
//! let config = ScorerConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by batch orchestration as it processes each file.
///
/// All methods default to no-ops. Positions are 1-indexed.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before the first file.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called before a file is extracted.
    fn on_file_start(&self, position: usize, total_files: usize, identifier: &str) {
        let _ = (position, total_files, identifier);
    }

    /// Called when a file was scored.
    fn on_file_complete(&self, position: usize, total_files: usize, points: u8) {
        let _ = (position, total_files, points);
    }

    /// Called when a file failed; the batch continues.
    fn on_file_error(&self, position: usize, total_files: usize, error: &str) {
        let _ = (position, total_files, error);
    }

    /// Called once after every file has been attempted.
    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let _ = (total_files, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ScorerConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        success_total: AtomicUsize,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_file_start(&self, _position: usize, _total: usize, _identifier: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_complete(&self, _position: usize, _total: usize, _points: u8) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_error(&self, _position: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _total: usize, success_count: usize) {
            self.success_total.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(3);
        cb.on_file_start(1, 3, "a.png");
        cb.on_file_complete(1, 3, 85);
        cb.on_file_error(2, 3, "boom");
        cb.on_batch_complete(3, 2);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_file_start(1, 2, "a.txt");
        tracker.on_file_complete(1, 2, 40);
        tracker.on_file_start(2, 2, "b.txt");
        tracker.on_file_error(2, 2, "no text");
        tracker.on_batch_complete(2, 1);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.success_total.load(Ordering::SeqCst), 1);
    }
}
