//! Review entry points: PDF in, compliance report out.
//!
//! [`review`] runs the whole pipeline and returns the report in memory;
//! [`review_to_file`] also renders it and writes it atomically. Each stage is
//! timed and reported through the optional progress callback.

use crate::config::{ApiKey, OutputFormat, ReviewConfig};
use crate::error::ReviewError;
use crate::output::{
    DocumentMetadata, Report, ReportMetadata, ReviewOutput, ReviewStats, DISCLAIMER,
};
use crate::pipeline::gemini::GeminiClient;
use crate::pipeline::input::{self, LoadedDocument};
use crate::pipeline::{render, request, sections};
use crate::progress::{ProgressCallback, ReviewStage};
use chrono::{DateTime, Local};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Directory used for reports when neither a path nor `OUTPUT_DIR` is given.
pub const DEFAULT_OUTPUT_DIR: &str = "./reports";

/// Review a PDF file or URL.
///
/// The API key is resolved first, so a missing credential fails before the
/// document is even read.
///
/// # Errors
/// Any [`ReviewError`]; see [`ReviewError::kind`] for the family.
pub async fn review(
    input_str: impl AsRef<str>,
    config: &ReviewConfig,
) -> Result<ReviewOutput, ReviewError> {
    let total_start = Instant::now();
    let input_str = input_str.as_ref();
    info!("Starting review: {}", input_str);

    // ── Step 1: Credential ───────────────────────────────────────────────
    let api_key = config.resolve_api_key()?;

    // ── Step 2: Load and validate the PDF ────────────────────────────────
    let cb = config.progress_callback.as_ref();
    let load_start = stage_start(cb, ReviewStage::Load);
    let loaded = input::load_input(input_str, config.download_timeout_secs).await;
    let document = stage_finish(cb, ReviewStage::Load, load_start, loaded)?;
    let load_ms = load_start.elapsed().as_millis() as u64;

    review_document(document, api_key, config, total_start, load_ms).await
}

/// Review PDF bytes already in memory.
///
/// `source_name` is used for the drawing category and the report header.
pub async fn review_bytes(
    bytes: Vec<u8>,
    source_name: &str,
    config: &ReviewConfig,
) -> Result<ReviewOutput, ReviewError> {
    let total_start = Instant::now();
    let api_key = config.resolve_api_key()?;

    let cb = config.progress_callback.as_ref();
    let load_start = stage_start(cb, ReviewStage::Load);
    let source = source_name.to_string();
    let loaded = tokio::task::spawn_blocking(move || input::load_bytes(&source, bytes))
        .await
        .map_err(|e| ReviewError::Internal(format!("PDF parse task panicked: {e}")))
        .and_then(|r| r);
    let document = stage_finish(cb, ReviewStage::Load, load_start, loaded)?;
    let load_ms = load_start.elapsed().as_millis() as u64;

    review_document(document, api_key, config, total_start, load_ms).await
}

/// Review and write the rendered report.
///
/// With `output_path = None` the report goes to [`default_output_path`]
/// under `$OUTPUT_DIR` (default `./reports`). Returns the path written.
pub async fn review_to_file(
    input_str: impl AsRef<str>,
    output_path: Option<&Path>,
    format: OutputFormat,
    config: &ReviewConfig,
) -> Result<(PathBuf, ReviewOutput), ReviewError> {
    let input_str = input_str.as_ref();
    let mut output = review(input_str, config).await?;

    let path = match output_path {
        Some(p) => p.to_path_buf(),
        None => default_output_path(&output_dir(), input_str, format, Local::now()),
    };

    let cb = config.progress_callback.as_ref();
    let write_start = stage_start(cb, ReviewStage::Write);
    let written = write_report(&output.report, format, &path).await;
    stage_finish(cb, ReviewStage::Write, write_start, written)?;

    output.stats.render_ms += write_start.elapsed().as_millis() as u64;
    info!("Report written to {}", path.display());
    Ok((path, output))
}

/// Synchronous wrapper around [`review`].
///
/// Creates a temporary tokio runtime internally.
pub fn review_sync(
    input_str: impl AsRef<str>,
    config: &ReviewConfig,
) -> Result<ReviewOutput, ReviewError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ReviewError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(review(input_str, config))
}

/// Read PDF metadata without calling the API.
///
/// Does not require an API key. `download_timeout_secs` bounds URL inputs.
pub async fn inspect(
    input_str: impl AsRef<str>,
    download_timeout_secs: u64,
) -> Result<DocumentMetadata, ReviewError> {
    let loaded = input::load_input(input_str.as_ref(), download_timeout_secs).await?;
    Ok(loaded.metadata)
}

/// Render `report` in `format` and write it atomically to `path`.
pub async fn write_report(
    report: &Report,
    format: OutputFormat,
    path: &Path,
) -> Result<(), ReviewError> {
    let bytes = render::render_report(report, format)?;
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
        .await
        .map_err(|e| ReviewError::Internal(format!("write task panicked: {e}")))?
}

/// Write via a temp file in the target directory, then rename over `path`.
///
/// A failed write never leaves a partial report behind.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ReviewError> {
    let write_err = |source: std::io::Error| ReviewError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// `<dir>/<input stem>_review_<YYYYmmdd_HHMMSS>.<ext>`.
pub fn default_output_path(
    dir: &Path,
    input_str: &str,
    format: OutputFormat,
    now: DateTime<Local>,
) -> PathBuf {
    let name = if input::is_url(input_str) {
        input_str
            .split(['?', '#'])
            .next()
            .and_then(|u| u.trim_end_matches('/').rsplit('/').next())
            .unwrap_or_default()
            .to_string()
    } else {
        Path::new(input_str)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    };
    let stem = Path::new(&name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    dir.join(format!(
        "{}_review_{}.{}",
        sanitize_stem(&stem),
        now.format("%Y%m%d_%H%M%S"),
        format.extension()
    ))
}

/// `$OUTPUT_DIR`, or [`DEFAULT_OUTPUT_DIR`].
pub fn output_dir() -> PathBuf {
    std::env::var("OUTPUT_DIR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn review_document(
    document: LoadedDocument,
    api_key: ApiKey,
    config: &ReviewConfig,
    total_start: Instant,
    load_ms: u64,
) -> Result<ReviewOutput, ReviewError> {
    let cb = config.progress_callback.as_ref();

    // ── Step 3: Build the request (all pre-flight checks) ────────────────
    let build_start = stage_start(cb, ReviewStage::BuildRequest);
    let built = request::build_request(&document, api_key, config);
    let request = stage_finish(cb, ReviewStage::BuildRequest, build_start, built)?;

    // ── Step 4: Call the model ───────────────────────────────────────────
    let api_start = stage_start(cb, ReviewStage::Analyse);
    let answered = match GeminiClient::from_config(config) {
        Ok(client) => client.analyse(&request).await,
        Err(e) => Err(e),
    };
    let response = stage_finish(cb, ReviewStage::Analyse, api_start, answered)?;
    let api_ms = api_start.elapsed().as_millis() as u64;

    // ── Step 5: Split into sections and assemble the report ──────────────
    let render_start = stage_start(cb, ReviewStage::Render);
    let sections = sections::parse_sections(&response.text, &config.section_rule);
    debug!("Parsed {} sections", sections.len());

    let metadata = ReportMetadata {
        project: config.project.clone(),
        review_type: config.review_type,
        model: response
            .model_version
            .clone()
            .unwrap_or_else(|| config.model.clone()),
        document: document.metadata,
        generated_at: Local::now(),
    };
    let report = Report::new(
        config.report_title.clone(),
        metadata,
        sections,
        config.include_disclaimer.then(|| DISCLAIMER.to_string()),
    );
    let render_ms = render_start.elapsed().as_millis() as u64;
    if let Some(cb) = cb {
        cb.on_stage_complete(ReviewStage::Render, render_ms);
    }

    let stats = ReviewStats {
        document_bytes: report.metadata().document.size_bytes,
        page_count: report.metadata().document.page_count,
        sections: report.sections().len(),
        prompt_tokens: response.prompt_tokens,
        output_tokens: response.output_tokens,
        load_ms,
        api_ms,
        render_ms,
        total_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Review complete: {} sections, {} prompt / {} output tokens, {}ms total",
        stats.sections, stats.prompt_tokens, stats.output_tokens, stats.total_ms
    );

    Ok(ReviewOutput {
        report,
        raw_response: response.text,
        stats,
    })
}

fn stage_start(cb: Option<&ProgressCallback>, stage: ReviewStage) -> Instant {
    if let Some(cb) = cb {
        cb.on_stage_start(stage);
    }
    Instant::now()
}

/// Report the stage outcome to the callback and pass the result through.
fn stage_finish<T>(
    cb: Option<&ProgressCallback>,
    stage: ReviewStage,
    start: Instant,
    result: Result<T, ReviewError>,
) -> Result<T, ReviewError> {
    if let Some(cb) = cb {
        match &result {
            Ok(_) => cb.on_stage_complete(stage, start.elapsed().as_millis() as u64),
            Err(e) => cb.on_stage_error(stage, &e.to_string()),
        }
    }
    result
}

fn sanitize_stem(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        "archopinion".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn inspect_reports_missing_file() {
        let err = tokio_test::block_on(inspect("/nonexistent/drawings.pdf", 5)).unwrap_err();
        assert!(matches!(err, ReviewError::FileNotFound { .. }));
    }

    #[test]
    fn default_path_from_local_file() {
        let p = default_output_path(
            Path::new("reports"),
            "/drawings/12 Acacia Ave (rev B).pdf",
            OutputFormat::Pdf,
            fixed_time(),
        );
        assert_eq!(
            p,
            PathBuf::from("reports/12_Acacia_Ave__rev_B_review_20240309_140507.pdf")
        );
    }

    #[test]
    fn default_path_from_url() {
        let p = default_output_path(
            Path::new("out"),
            "https://example.com/plans/site-plan.pdf?dl=1",
            OutputFormat::Markdown,
            fixed_time(),
        );
        assert_eq!(p, PathBuf::from("out/site-plan_review_20240309_140507.md"));
    }

    #[test]
    fn default_path_falls_back_to_crate_name() {
        let p = default_output_path(Path::new("."), "", OutputFormat::Json, fixed_time());
        assert!(p.to_string_lossy().ends_with("archopinion_review_20240309_140507.json"));
    }

    #[test]
    fn atomic_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/report.md");
        write_atomic(&path, b"# Report\n").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"# Report\n");
        // No stray temp files next to the report.
        let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn atomic_write_failure_is_render_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        // A regular file cannot be used as a directory.
        let err = write_atomic(&blocker.join("report.pdf"), b"x").unwrap_err();
        assert!(matches!(err, ReviewError::OutputWriteFailed { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Render);
    }

    #[tokio::test]
    async fn missing_key_fails_before_reading_input() {
        let config = ReviewConfig {
            env_file: None,
            ..ReviewConfig::default()
        };
        // Only meaningful when the environment has no key set.
        if crate::config::API_KEY_ENV_VARS
            .iter()
            .any(|v| std::env::var(v).is_ok_and(|k| !k.trim().is_empty()))
        {
            return;
        }
        let err = review("/does/not/exist.pdf", &config).await.unwrap_err();
        assert!(matches!(err, ReviewError::CredentialMissing { .. }));
    }
}
