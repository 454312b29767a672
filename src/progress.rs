//! Progress-callback trait for pipeline stage events.
//!
//! Inject an [`Arc<dyn ReviewProgressCallback>`] via
//! [`crate::config::ReviewConfigBuilder::progress_callback`] to be told when
//! each stage of a review starts, finishes or fails. The API call dominates
//! wall-clock time (often a minute for a full drawing set), so a spinner
//! driven by these events is the only feedback a CLI user gets.
//!
//! # Example
//!
//! ```rust
//! use archopinion::{ReviewConfig, ReviewProgressCallback, ReviewStage};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl ReviewProgressCallback for Printer {
//!     fn on_stage_complete(&self, stage: ReviewStage, elapsed_ms: u64) {
//!         eprintln!("{stage} done in {elapsed_ms}ms");
//!     }
//! }
//!
//! let config = ReviewConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

/// The stages of a review, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReviewStage {
    /// Read and validate the PDF.
    Load,
    /// Select the prompt and assemble the multimodal request.
    BuildRequest,
    /// Call the Gemini API.
    Analyse,
    /// Split the answer into sections and lay out the report.
    Render,
    /// Write the report file.
    Write,
}

impl fmt::Display for ReviewStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReviewStage::Load => "Loading PDF",
            ReviewStage::BuildRequest => "Building request",
            ReviewStage::Analyse => "Analysing drawings",
            ReviewStage::Render => "Rendering report",
            ReviewStage::Write => "Writing report",
        };
        f.write_str(s)
    }
}

/// Called by the review pipeline as it moves through its stages.
///
/// All methods have default no-op implementations so callers only
/// override what they care about.
pub trait ReviewProgressCallback: Send + Sync {
    /// Called when a stage begins.
    fn on_stage_start(&self, stage: ReviewStage) {
        let _ = stage;
    }

    /// Called when a stage finishes successfully.
    fn on_stage_complete(&self, stage: ReviewStage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }

    /// Called when a stage fails; the error is also returned to the caller.
    fn on_stage_error(&self, stage: ReviewStage, error: &str) {
        let _ = (stage, error);
    }

    /// Called before a retry of the API call.
    fn on_retry(&self, attempt: u32, max_retries: u32, backoff_ms: u64) {
        let _ = (attempt, max_retries, backoff_ms);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ReviewProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ReviewConfig`].
pub type ProgressCallback = Arc<dyn ReviewProgressCallback>;
