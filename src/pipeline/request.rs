//! Request builder: PDF bytes + prompt + credential → one multimodal request.
//!
//! All validation that can fail without the network happens here, so a bad
//! selection or an oversized drawing set never costs API quota.

use crate::config::{ApiKey, ResponseFormat, ReviewConfig, ReviewType};
use crate::error::ReviewError;
use crate::pipeline::input::{check_magic, LoadedDocument};
use crate::prompts;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// MIME type of the inline document part.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// A fully validated request, ready for [`crate::pipeline::gemini::GeminiClient`].
#[derive(Clone)]
pub struct AnalysisRequest {
    review_type: ReviewType,
    prompt: String,
    context: Option<String>,
    document: Vec<u8>,
    api_key: ApiKey,
    temperature: f32,
    max_output_tokens: u32,
    response_format: ResponseFormat,
}

impl fmt::Debug for AnalysisRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisRequest")
            .field("review_type", &self.review_type)
            .field("prompt_len", &self.prompt.len())
            .field("context_len", &self.context.as_ref().map(|c| c.len()))
            .field("document_bytes", &self.document.len())
            .field("api_key", &self.api_key)
            .finish()
    }
}

impl AnalysisRequest {
    pub fn review_type(&self) -> ReviewType {
        self.review_type
    }

    /// The prompt template text, exactly as selected.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Project details, file label and user instructions, if any.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn document(&self) -> &[u8] {
        &self.document
    }

    pub fn api_key(&self) -> &ApiKey {
        &self.api_key
    }

    /// The JSON body for `models/{model}:generateContent`.
    ///
    /// Part order: document, template, context. Gemini reads documents
    /// placed before the instructions more reliably.
    pub fn to_body(&self) -> GenerateContentRequest {
        let mut parts = Vec::with_capacity(3);
        parts.push(Part::inline(PDF_MIME_TYPE, STANDARD.encode(&self.document)));
        parts.push(Part::text(self.prompt.clone()));
        if let Some(ref ctx) = self.context {
            parts.push(Part::text(ctx.clone()));
        }

        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: Some(GenerationConfig {
                temperature: Some(self.temperature),
                max_output_tokens: Some(self.max_output_tokens),
                response_mime_type: match self.response_format {
                    ResponseFormat::Json => Some("application/json".to_string()),
                    ResponseFormat::Markdown => None,
                },
            }),
        }
    }
}

/// Build the request for a loaded document.
pub fn build_request(
    document: &LoadedDocument,
    api_key: ApiKey,
    config: &ReviewConfig,
) -> Result<AnalysisRequest, ReviewError> {
    let context = prompts::build_context(
        &config.project,
        Some(&document.metadata.label()),
        config.instructions.as_deref(),
        config.response_format,
    );
    assemble(
        &document.metadata.source,
        &document.bytes,
        config.review_type,
        config.custom_prompt.as_deref(),
        context,
        api_key,
        config,
    )
}

/// Build a request from raw bytes, applying every pre-flight check.
///
/// Order: credential, prompt, document magic, size. Each failure is
/// returned before anything touches the network.
pub fn assemble(
    source: &str,
    document: &[u8],
    review_type: ReviewType,
    custom_prompt: Option<&str>,
    context: Option<String>,
    api_key: ApiKey,
    config: &ReviewConfig,
) -> Result<AnalysisRequest, ReviewError> {
    if api_key.is_empty() {
        return Err(ReviewError::CredentialMissing {
            hint: "The API key is empty.".into(),
        });
    }

    let prompt = prompts::select_prompt(review_type, custom_prompt)?;

    check_magic(source, document)?;

    if document.len() > config.max_document_bytes {
        return Err(ReviewError::PayloadTooLarge {
            size: document.len(),
            limit: config.max_document_bytes,
        });
    }

    debug!(
        "Built {} request: {} document bytes, {} prompt chars",
        review_type,
        document.len(),
        prompt.len()
    );

    Ok(AnalysisRequest {
        review_type,
        prompt,
        context,
        document: document.to_vec(),
        api_key,
        temperature: config.temperature,
        max_output_tokens: config.max_output_tokens,
        response_format: config.response_format,
    })
}

// ── Wire types (Gemini generateContent) ──────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    pub fn inline(mime_type: &str, data_b64: String) -> Self {
        Self {
            text: None,
            inline_data: Some(Blob {
                mime_type: mime_type.to_string(),
                data: data_b64,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::{BUILDING_REGS_PROMPT, NPPF_PROMPT};

    const TINY_PDF: &[u8] = b"%PDF-1.4\n1 0 obj\n<<>>\nendobj\n%%EOF";

    fn config() -> ReviewConfig {
        ReviewConfig::default()
    }

    fn key() -> ApiKey {
        ApiKey::new("k")
    }

    #[test]
    fn request_carries_exact_template() {
        for (t, expected) in [
            (ReviewType::Nppf, NPPF_PROMPT),
            (ReviewType::BuildingRegs, BUILDING_REGS_PROMPT),
        ] {
            let req = assemble("a.pdf", TINY_PDF, t, None, None, key(), &config()).unwrap();
            assert_eq!(req.prompt(), expected);
            let body = req.to_body();
            assert_eq!(body.contents[0].parts[1].text.as_deref(), Some(expected));
        }
    }

    #[test]
    fn body_layout() {
        let req = assemble(
            "a.pdf",
            TINY_PDF,
            ReviewType::Nppf,
            None,
            Some("PROJECT".into()),
            key(),
            &config(),
        )
        .unwrap();
        let json = serde_json::to_value(req.to_body()).unwrap();
        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts.as_array().unwrap().len(), 3);
        assert_eq!(parts[0]["inlineData"]["mimeType"], "application/pdf");
        assert_eq!(parts[0]["inlineData"]["data"], STANDARD.encode(TINY_PDF));
        assert_eq!(parts[2]["text"], "PROJECT");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 8192);
        assert!(json["generationConfig"].get("responseMimeType").is_none());
        // The key never appears in the body.
        assert!(!json.to_string().contains("\"k\""));
    }

    #[test]
    fn json_format_sets_response_mime_type() {
        let mut cfg = config();
        cfg.response_format = ResponseFormat::Json;
        let req = assemble("a.pdf", TINY_PDF, ReviewType::Nppf, None, None, key(), &cfg).unwrap();
        let json = serde_json::to_value(req.to_body()).unwrap();
        assert_eq!(
            json["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[test]
    fn oversized_document_rejected() {
        let mut cfg = config();
        cfg.max_document_bytes = 16;
        let mut big = TINY_PDF.to_vec();
        big.resize(17, b' ');
        let err = assemble("a.pdf", &big, ReviewType::Nppf, None, None, key(), &cfg).unwrap_err();
        assert!(matches!(
            err,
            ReviewError::PayloadTooLarge { size: 17, limit: 16 }
        ));
    }

    #[test]
    fn document_at_limit_accepted() {
        let mut cfg = config();
        cfg.max_document_bytes = TINY_PDF.len();
        assert!(assemble("a.pdf", TINY_PDF, ReviewType::Nppf, None, None, key(), &cfg).is_ok());
    }

    #[test]
    fn custom_prompt_used_verbatim() {
        let req = assemble(
            "a.pdf",
            TINY_PDF,
            ReviewType::Custom,
            Some("Check stair pitch only"),
            None,
            key(),
            &config(),
        )
        .unwrap();
        assert_eq!(req.prompt(), "Check stair pitch only");
    }

    #[test]
    fn empty_custom_prompt_is_configuration_error() {
        let err = assemble("a.pdf", TINY_PDF, ReviewType::Custom, Some(""), None, key(), &config())
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn non_pdf_rejected() {
        let err = assemble("a.pdf", b"hello", ReviewType::Nppf, None, None, key(), &config())
            .unwrap_err();
        assert!(matches!(err, ReviewError::NotAPdf { .. }));
        let err = assemble("a.pdf", b"", ReviewType::Nppf, None, None, key(), &config())
            .unwrap_err();
        assert!(matches!(err, ReviewError::EmptyDocument { .. }));
    }

    #[test]
    fn empty_key_rejected() {
        let err = assemble(
            "a.pdf",
            TINY_PDF,
            ReviewType::Nppf,
            None,
            None,
            ApiKey::new("  "),
            &config(),
        )
        .unwrap_err();
        assert!(matches!(err, ReviewError::CredentialMissing { .. }));
    }

    #[test]
    fn debug_hides_key_and_bytes() {
        let req = assemble(
            "a.pdf",
            TINY_PDF,
            ReviewType::Nppf,
            None,
            None,
            ApiKey::new("secret-key"),
            &config(),
        )
        .unwrap();
        let dbg = format!("{req:?}");
        assert!(!dbg.contains("secret-key"));
        assert!(dbg.contains("document_bytes"));
    }
}
