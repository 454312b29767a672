//! Pipeline stages for a drawing review.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and only [`gemini`] touches the API.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ request ──▶ gemini ──▶ postprocess ──▶ sections ──▶ render
//! (path/URL)  (prompt+PDF)  (HTTP)   (cleanup)      (split)      (PDF/MD/JSON)
//! ```
//!
//! 1. [`input`]: read a local path or download a URL; check `%PDF` and
//!    parse with lopdf for page count and Info metadata
//! 2. [`request`]: select the template, check the size limit, build the
//!    `generateContent` body with the PDF inline
//! 3. [`gemini`]: one POST with optional retry; maps HTTP failures to
//!    network errors
//! 4. [`postprocess`]: deterministic text cleanup (fences, line endings)
//! 5. [`sections`]: split the answer into titled sections; never fails
//! 6. [`render`]: paginated A4 PDF, Markdown or JSON

pub mod gemini;
pub mod input;
pub mod postprocess;
pub mod render;
pub mod request;
pub mod sections;
