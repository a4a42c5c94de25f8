//! Progress-callback trait for scan stage events.
//!
//! Inject an [`Arc<dyn ScanProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to be told as
//! the pipeline moves through its stages. The CLI renders these as a spinner;
//! a server could forward them to a job table.
//!
//! # Example
//!
//! ```rust
//! use cardscan::{PipelineConfig, ScanProgressCallback, ScanStage};
//! use std::sync::{Arc, Mutex};
//!
//! struct StageLog(Mutex<Vec<ScanStage>>);
//!
//! impl ScanProgressCallback for StageLog {
//!     fn on_stage(&self, stage: ScanStage) {
//!         self.0.lock().unwrap().push(stage);
//!     }
//! }
//!
//! let log = Arc::new(StageLog(Mutex::new(Vec::new())));
//! let config = PipelineConfig::builder()
//!     .progress_callback(log as Arc<dyn ScanProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The linear states a scan passes through.
///
/// Stages are reported in this order; `Persisted` is skipped when no record
/// sink is configured or no insurance id was supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanStage {
    Received,
    Validated,
    Normalized,
    Compressed,
    Recognized,
    Extracted,
    Assembled,
    Uploaded,
    Persisted,
    Completed,
}

impl fmt::Display for ScanStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScanStage::Received => "received",
            ScanStage::Validated => "validated",
            ScanStage::Normalized => "orientation corrected",
            ScanStage::Compressed => "compressed",
            ScanStage::Recognized => "OCR complete",
            ScanStage::Extracted => "fields extracted",
            ScanStage::Assembled => "PDF assembled",
            ScanStage::Uploaded => "uploaded",
            ScanStage::Persisted => "database updated",
            ScanStage::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Called by the scan pipeline as it advances.
///
/// All methods have no-op defaults so callers only override what they need.
pub trait ScanProgressCallback: Send + Sync {
    /// Called when a stage has been reached.
    fn on_stage(&self, stage: ScanStage) {
        let _ = stage;
    }

    /// Called when a step degraded but the scan continues
    /// (e.g. compression failed and the original image is used).
    fn on_degraded(&self, stage: ScanStage, detail: String) {
        let _ = (stage, detail);
    }

    /// Called once if the scan aborts. `last_stage` is the last stage reached.
    fn on_failed(&self, last_stage: ScanStage, error: String) {
        let _ = (last_stage, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ScanProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn ScanProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct TrackingCallback {
        stages: Mutex<Vec<ScanStage>>,
        degraded: AtomicUsize,
        failed: Mutex<Option<(ScanStage, String)>>,
    }

    impl ScanProgressCallback for TrackingCallback {
        fn on_stage(&self, stage: ScanStage) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_degraded(&self, _stage: ScanStage, _detail: String) {
            self.degraded.fetch_add(1, Ordering::SeqCst);
        }

        fn on_failed(&self, last_stage: ScanStage, error: String) {
            *self.failed.lock().unwrap() = Some((last_stage, error));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage(ScanStage::Received);
        cb.on_degraded(ScanStage::Compressed, "encode failed".into());
        cb.on_failed(ScanStage::Recognized, "OCR down".into());
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            stages: Mutex::new(Vec::new()),
            degraded: AtomicUsize::new(0),
            failed: Mutex::new(None),
        };

        tracker.on_stage(ScanStage::Received);
        tracker.on_stage(ScanStage::Validated);
        tracker.on_degraded(ScanStage::Compressed, "x".into());
        tracker.on_failed(ScanStage::Validated, "boom".into());

        assert_eq!(
            *tracker.stages.lock().unwrap(),
            vec![ScanStage::Received, ScanStage::Validated]
        );
        assert_eq!(tracker.degraded.load(Ordering::SeqCst), 1);
        assert_eq!(
            tracker.failed.lock().unwrap().clone(),
            Some((ScanStage::Validated, "boom".to_string()))
        );
    }

    #[test]
    fn stage_display_is_human_readable() {
        assert_eq!(ScanStage::Recognized.to_string(), "OCR complete");
        assert_eq!(ScanStage::Assembled.to_string(), "PDF assembled");
    }
}
