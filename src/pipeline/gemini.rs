//! Gemini `generateContent` client: the only stage with API network I/O.
//!
//! One POST per review. HTTP failures are mapped onto the network family of
//! [`ReviewError`] so the CLI can report them with a stable exit status.
//!
//! ## Retry Strategy
//!
//! Off by default (`max_retries = 0`). When enabled, only transient failures
//! are retried (429, 5xx, timeouts, transport errors) with exponential
//! backoff `retry_backoff_ms * 2^(attempt-1)`. A `Retry-After` header on a
//! 429 overrides the computed delay.

use crate::config::ReviewConfig;
use crate::error::ReviewError;
use crate::pipeline::request::{AnalysisRequest, Content, GenerateContentRequest};
use crate::progress::ProgressCallback;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Header carrying the API key. Keeps the secret out of URLs and logs.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// The model's answer plus call bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct AnalysisResponse {
    /// Concatenated text of the first candidate. May be empty.
    pub text: String,
    pub model_version: Option<String>,
    pub finish_reason: Option<String>,
    pub prompt_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: u64,
    pub retries: u32,
}

/// HTTP client for one model endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    timeout_secs: u64,
    max_retries: u32,
    retry_backoff_ms: u64,
    max_document_bytes: usize,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl GeminiClient {
    pub fn from_config(config: &ReviewConfig) -> Result<Self, ReviewError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| ReviewError::InvalidConfig(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout_secs: config.api_timeout_secs,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            max_document_bytes: config.max_document_bytes,
            progress: config.progress_callback.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Full URL of the `generateContent` method for the configured model.
    pub fn endpoint(&self) -> String {
        let model = self.model.strip_prefix("models/").unwrap_or(&self.model);
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    /// Send the request, retrying transient failures if configured.
    pub async fn analyse(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, ReviewError> {
        let start = Instant::now();
        let body = request.to_body();
        info!(
            "Calling {} ({} review, {} document bytes)",
            self.model,
            request.review_type(),
            request.document().len()
        );

        let mut attempt = 0u32;
        loop {
            match self.send_once(request, &body).await {
                Ok(mut response) => {
                    response.duration_ms = start.elapsed().as_millis() as u64;
                    response.retries = attempt;
                    debug!(
                        "{} prompt tokens, {} output tokens, finish reason {:?}, {}ms",
                        response.prompt_tokens,
                        response.output_tokens,
                        response.finish_reason,
                        response.duration_ms
                    );
                    return Ok(response);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let backoff = self.backoff_ms(attempt, &e);
                    warn!(
                        "Attempt {} failed ({}); retry {}/{} after {}ms",
                        attempt, e, attempt, self.max_retries, backoff
                    );
                    if let Some(ref cb) = self.progress {
                        cb.on_retry(attempt, self.max_retries, backoff);
                    }
                    sleep(Duration::from_millis(backoff)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn backoff_ms(&self, attempt: u32, err: &ReviewError) -> u64 {
        if let ReviewError::RateLimitExceeded {
            retry_after_secs: Some(secs),
        } = err
        {
            return secs.saturating_mul(1000);
        }
        self.retry_backoff_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
    }

    async fn send_once(
        &self,
        request: &AnalysisRequest,
        body: &GenerateContentRequest,
    ) -> Result<AnalysisResponse, ReviewError> {
        let response = self
            .http
            .post(self.endpoint())
            .header(API_KEY_HEADER, request.api_key().expose())
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let text = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            return Err(map_status(
                status,
                retry_after,
                &text,
                (request.document().len(), self.max_document_bytes),
            ));
        }

        parse_response(&text)
    }

    fn transport_error(&self, e: reqwest::Error) -> ReviewError {
        if e.is_timeout() {
            ReviewError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            ReviewError::RequestFailed {
                reason: e.to_string(),
            }
        }
    }
}

/// Map a non-success status to an error, using the Google error body when present.
fn map_status(
    status: StatusCode,
    retry_after_secs: Option<u64>,
    body: &str,
    (size, limit): (usize, usize),
) -> ReviewError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|e| match e.error.status {
            Some(s) if !s.is_empty() => format!("{s}: {}", e.error.message),
            _ => e.error.message,
        })
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("no response body")
                    .to_string()
            } else {
                trimmed.chars().take(500).collect()
            }
        });

    match status.as_u16() {
        429 => ReviewError::RateLimitExceeded { retry_after_secs },
        401 | 403 => ReviewError::AuthError {
            status: status.as_u16(),
            detail: message,
        },
        413 => ReviewError::PayloadTooLarge { size, limit },
        code => ReviewError::ApiError {
            status: code,
            message,
        },
    }
}

/// Decode a successful body into an [`AnalysisResponse`].
pub fn parse_response(body: &str) -> Result<AnalysisResponse, ReviewError> {
    let parsed: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| ReviewError::InvalidResponse {
            detail: format!("cannot decode response body: {e}"),
        })?;

    let usage = parsed.usage_metadata.unwrap_or_default();

    let Some(candidate) = parsed.candidates.into_iter().next() else {
        if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ReviewError::Blocked { reason });
        }
        return Err(ReviewError::InvalidResponse {
            detail: "response contains no candidates".into(),
        });
    };

    let text = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    Ok(AnalysisResponse {
        text,
        model_version: parsed.model_version,
        finish_reason: candidate.finish_reason,
        prompt_tokens: usage.prompt_token_count,
        output_tokens: usage.candidates_token_count,
        duration_ms: 0,
        retries: 0,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}
