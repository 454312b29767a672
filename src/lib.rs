//! # archopinion
//!
//! Review architectural drawing PDFs for UK planning and building-control
//! compliance with a multimodal model, and render the answer as a report.
//!
//! ## How it works
//!
//! The drawing set is sent to Gemini natively as an inline PDF, next to a
//! fixed compliance prompt (NPPF, Local Plan, Building Regulations,
//! Permitted Development, or your own). The model's free-text answer is split
//! into titled sections and laid out as a paginated A4 PDF with a project
//! information header and a disclaimer.
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    read a local file or download a URL, validate with lopdf
//!  ├─ 2. Request  template + project context + base64 PDF, size-checked
//!  ├─ 3. Gemini   one generateContent call (optional retry)
//!  ├─ 4. Sections cleanup, then split on headings / title lines / JSON
//!  └─ 5. Render   A4 PDF (or Markdown / JSON), written atomically
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use archopinion::{review, ReviewConfig, ReviewType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Key read from GEMINI_API_KEY (or GOOGLE_API_KEY, or .env)
//!     let config = ReviewConfig::builder()
//!         .review_type(ReviewType::Nppf)
//!         .build()?;
//!     let output = review("floor-plans-proposed.pdf", &config).await?;
//!     for section in output.report.sections() {
//!         println!("## {}\n{}\n", section.title, section.body);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `archopinion` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! archopinion = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod review;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ApiKey, OutputFormat, ProjectInfo, ResponseFormat, ReviewConfig, ReviewConfigBuilder,
    ReviewType, SectionRule,
};
pub use error::{ErrorKind, ReviewError};
pub use output::{
    DocumentKind, DocumentMetadata, Report, ReportMetadata, ReviewOutput, ReviewStats, Section,
};
pub use pipeline::gemini::AnalysisResponse;
pub use pipeline::request::AnalysisRequest;
pub use progress::{NoopProgressCallback, ProgressCallback, ReviewProgressCallback, ReviewStage};
pub use review::{default_output_path, inspect, review, review_bytes, review_sync, review_to_file};
