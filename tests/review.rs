//! Integration tests for the review pipeline.
//!
//! The Gemini API is replaced by a local mockito server, so these run
//! offline and need no API key.
//!
//! Run with:
//!   RUST_LOG=debug cargo test --test review -- --nocapture

use archopinion::prompts::NPPF_PROMPT;
use archopinion::{
    inspect, review, review_bytes, review_to_file, ErrorKind, OutputFormat, ReviewConfig,
    ReviewError, ReviewType,
};
use lopdf::{dictionary, Document, Object};
use mockito::{Matcher, ServerGuard};
use std::path::PathBuf;

const ENDPOINT: &str = "/models/gemini-test:generateContent";

// ── Test helpers ─────────────────────────────────────────────────────────────

/// A valid PDF with `pages` empty A4 pages.
fn drawing_pdf(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = (0..pages)
        .map(|_| {
            Object::Reference(doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }))
        })
        .collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

fn write_pdf(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Route library logs through the test harness; `RUST_LOG=debug` shows them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config_for(server: &ServerGuard) -> ReviewConfig {
    init_tracing();
    ReviewConfig::builder()
        .review_type(ReviewType::Nppf)
        .api_base_url(server.url())
        .model("gemini-test")
        .api_key("test-key")
        .retry_backoff_ms(1)
        .build()
        .unwrap()
}

fn reply(text: &str) -> String {
    serde_json::json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 1290, "candidatesTokenCount": 40}
    })
    .to_string()
}

/// Matches a body carrying `prompt` as one whole text part.
fn text_part(prompt: &str) -> Matcher {
    let part = serde_json::json!({ "text": prompt }).to_string();
    Matcher::Regex(regex::escape(&part))
}

// ── End-to-end ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn nppf_review_of_two_page_pdf_yields_two_sections() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", ENDPOINT)
        .match_header("x-goog-api-key", "test-key")
        .match_body(Matcher::AllOf(vec![
            text_part(NPPF_PROMPT),
            Matcher::Regex(r#""mimeType":"application/pdf""#.to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(reply("Section A\n...\nSection B\n..."))
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let input = write_pdf(&dir, "floor-plans-proposed.pdf", &drawing_pdf(2));

    let output = review(input.to_string_lossy(), &config_for(&server))
        .await
        .unwrap();
    mock.assert_async().await;

    let titles: Vec<&str> = output
        .report
        .sections()
        .iter()
        .map(|s| s.title.as_str())
        .collect();
    assert_eq!(titles, ["Section A", "Section B"]);
    assert_eq!(output.report.sections()[0].body, "...");
    assert_eq!(output.stats.page_count, 2);
    assert_eq!(output.stats.sections, 2);
    assert_eq!(output.stats.prompt_tokens, 1290);
    assert_eq!(output.report.metadata().review_type, ReviewType::Nppf);
}

#[tokio::test]
async fn empty_answer_becomes_one_unstructured_section() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", ENDPOINT)
        .with_status(200)
        .with_body(reply(""))
        .create_async()
        .await;

    let output = review_bytes(drawing_pdf(1), "site-plan.pdf", &config_for(&server))
        .await
        .unwrap();
    mock.assert_async().await;

    let sections = output.report.sections();
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].title, "Unstructured Output");
    assert_eq!(sections[0].body, "");
}

#[tokio::test]
async fn unmarked_answer_is_kept_verbatim() {
    let mut server = mockito::Server::new_async().await;
    let answer = "the proposal appears acceptable in scale and massing.";
    server
        .mock("POST", ENDPOINT)
        .with_status(200)
        .with_body(reply(answer))
        .create_async()
        .await;

    let output = review_bytes(drawing_pdf(1), "plans.pdf", &config_for(&server))
        .await
        .unwrap();
    let sections = output.report.sections();
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].title, "Unstructured Output");
    assert_eq!(sections[0].body, answer);
    assert_eq!(output.raw_response, answer);
}

#[tokio::test]
async fn report_file_is_a_loadable_pdf() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", ENDPOINT)
        .with_status(200)
        .with_body(reply(
            "## Design\nHeight and massing respect the street.\n\n## Heritage\nNo listed buildings nearby.",
        ))
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let input = write_pdf(&dir, "elevations-proposed.pdf", &drawing_pdf(2));
    let out = dir.path().join("report.pdf");

    let (path, output) = review_to_file(
        input.to_string_lossy(),
        Some(&out),
        OutputFormat::Pdf,
        &config_for(&server),
    )
    .await
    .unwrap();

    assert_eq!(path, out);
    assert_eq!(output.report.sections().len(), 2);
    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes.starts_with(b"%PDF"));
    let doc = Document::load_mem(&bytes).unwrap();
    assert!(!doc.get_pages().is_empty());
}

// ── Inspect ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn inspect_downloads_url_without_key() {
    init_tracing();
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/planning/elevations-proposed.pdf")
        .with_status(200)
        .with_header("content-type", "application/pdf")
        .with_body(drawing_pdf(3))
        .create_async()
        .await;

    let url = format!("{}/planning/elevations-proposed.pdf", server.url());
    let meta = inspect(&url, 5).await.unwrap();
    assert_eq!(meta.page_count, 3);
    assert_eq!(meta.source, "elevations-proposed.pdf");
}

#[tokio::test]
async fn inspect_honours_download_timeout() {
    init_tracing();
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/slow.pdf")
        .with_status(200)
        .with_chunked_body(|w: &mut dyn std::io::Write| {
            std::thread::sleep(std::time::Duration::from_millis(2500));
            w.write_all(b"%PDF-1.5")
        })
        .create_async()
        .await;

    let url = format!("{}/slow.pdf", server.url());
    let err = inspect(&url, 1).await.unwrap_err();
    assert!(matches!(err, ReviewError::DownloadTimeout { secs: 1, .. }));
    assert_eq!(err.kind(), ErrorKind::Input);
}

// ── Failures ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn oversized_document_fails_before_any_request() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", ENDPOINT)
        .with_status(200)
        .with_body(reply("never"))
        .expect(0)
        .create_async()
        .await;

    let mut config = config_for(&server);
    config.max_document_bytes = 64;

    let err = review_bytes(drawing_pdf(2), "plans.pdf", &config)
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::PayloadTooLarge { limit: 64, .. }));
    assert_eq!(err.kind(), ErrorKind::Input);
    mock.assert_async().await;
}

#[tokio::test]
async fn missing_file_is_an_input_error() {
    let server = mockito::Server::new_async().await;
    let err = review("/nonexistent/plans.pdf", &config_for(&server))
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::FileNotFound { .. }));
    assert_eq!(err.kind().exit_code(), 2);
}

#[tokio::test]
async fn rate_limit_maps_to_network_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", ENDPOINT)
        .with_status(429)
        .with_header("retry-after", "7")
        .with_body(r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#)
        .expect(1)
        .create_async()
        .await;

    let err = review_bytes(drawing_pdf(1), "plans.pdf", &config_for(&server))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReviewError::RateLimitExceeded {
            retry_after_secs: Some(7)
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Network);
}

#[tokio::test]
async fn rejected_key_maps_to_network_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", ENDPOINT)
        .with_status(401)
        .with_body(r#"{"error":{"code":401,"message":"API key not valid","status":"UNAUTHENTICATED"}}"#)
        .create_async()
        .await;

    let err = review_bytes(drawing_pdf(1), "plans.pdf", &config_for(&server))
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::AuthError { status: 401, .. }));
    assert_eq!(err.kind().exit_code(), 4);
}

#[tokio::test]
async fn missing_key_is_a_configuration_error() {
    if archopinion::config::API_KEY_ENV_VARS
        .iter()
        .any(|v| std::env::var(v).is_ok_and(|k| !k.trim().is_empty()))
    {
        println!("SKIP: an API key is set in the environment");
        return;
    }
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", ENDPOINT)
        .expect(0)
        .create_async()
        .await;

    let config = ReviewConfig::builder()
        .api_base_url(server.url())
        .build()
        .unwrap();
    let err = review_bytes(drawing_pdf(1), "plans.pdf", &config)
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::CredentialMissing { .. }));
    assert_eq!(err.kind(), ErrorKind::Configuration);
    mock.assert_async().await;
}
