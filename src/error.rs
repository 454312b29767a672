//! Error types for the archopinion library.
//!
//! Every failure surfaces as one [`ReviewError`]. Variants are grouped into
//! four families, exposed through [`ReviewError::kind`]:
//!
//! * **Input**: the PDF is missing, unreadable, corrupt or too large.
//! * **Configuration**: bad review selection, empty prompt, missing key.
//! * **Network**: the Gemini call failed, timed out or was refused.
//! * **Render**: the report could not be produced or written.
//!
//! The CLI maps each family to its own exit status so scripts can tell a
//! bad drawing apart from an expired API key without parsing messages.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the archopinion library.
#[derive(Debug, Error)]
pub enum ReviewError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The document contains no bytes at all.
    #[error("Document '{source_name}' is empty")]
    EmptyDocument { source_name: String },

    /// The bytes do not start with the `%PDF` magic.
    #[error("File is not a valid PDF: '{source_name}'\nFirst bytes: {magic:?}")]
    NotAPdf { source_name: String, magic: Vec<u8> },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{source_name}' is corrupt: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    CorruptPdf { source_name: String, detail: String },

    /// The document exceeds the inline-document limit of the API.
    #[error("Document is {size} bytes, above the {limit}-byte limit for inline documents.\nSplit the drawing set or raise --max-document-mb.")]
    PayloadTooLarge { size: usize, limit: usize },

    // ── Configuration errors ──────────────────────────────────────────────
    /// The review type string does not name a known prompt category.
    #[error("Unknown review type '{value}'. Expected one of: nppf, local-plan, building-regs, pdr, custom")]
    UnknownReviewType { value: String },

    /// The selected review type has no prompt text (e.g. `custom` without `--prompt-file`).
    #[error("Review type '{review_type}' has no prompt text.\nProvide a custom prompt with --prompt-file.")]
    EmptyPrompt { review_type: String },

    /// No API credential in the config, the environment, or the config file.
    #[error("Gemini API key is missing.\n{hint}")]
    CredentialMissing { hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Network errors ────────────────────────────────────────────────────
    /// Transport-level failure (DNS, TLS, connection reset).
    #[error("Request to the Gemini API failed: {reason}")]
    RequestFailed { reason: String },

    /// The API call exceeded the per-call timeout.
    #[error("Gemini API call timed out after {secs}s\nIncrease --api-timeout for large drawing sets.")]
    Timeout { secs: u64 },

    /// HTTP 429 from the API.
    #[error("Rate limit exceeded for the Gemini API{}", retry_hint(.retry_after_secs))]
    RateLimitExceeded { retry_after_secs: Option<u64> },

    /// HTTP 401/403: the key is wrong, expired or lacks access to the model.
    #[error("Authentication error from the Gemini API (HTTP {status}): {detail}")]
    AuthError { status: u16, detail: String },

    /// Any other non-success HTTP status.
    #[error("Gemini API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The API refused to answer the prompt.
    #[error("Gemini blocked the request: {reason}")]
    Blocked { reason: String },

    /// The body could not be decoded or contained no candidates.
    #[error("Invalid response from the Gemini API: {detail}")]
    InvalidResponse { detail: String },

    // ── Render errors ─────────────────────────────────────────────────────
    /// The report document could not be laid out or serialised.
    #[error("Failed to render report: {detail}")]
    RenderFailed { detail: String },

    /// Could not create or write the report file.
    #[error("Failed to write report '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(" (retry after {secs}s)"),
        None => String::new(),
    }
}

/// Error family, used for the CLI exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    Configuration,
    Network,
    Render,
    Internal,
}

impl ErrorKind {
    /// Process exit status for this family. Never 0.
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Internal => 1,
            ErrorKind::Input => 2,
            ErrorKind::Configuration => 3,
            ErrorKind::Network => 4,
            ErrorKind::Render => 5,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Input => "input error",
            ErrorKind::Configuration => "configuration error",
            ErrorKind::Network => "network error",
            ErrorKind::Render => "render error",
            ErrorKind::Internal => "internal error",
        };
        f.write_str(name)
    }
}

impl ReviewError {
    /// The family this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        use ReviewError::*;
        match self {
            FileNotFound { .. }
            | PermissionDenied { .. }
            | InvalidInput { .. }
            | DownloadFailed { .. }
            | DownloadTimeout { .. }
            | EmptyDocument { .. }
            | NotAPdf { .. }
            | CorruptPdf { .. }
            | PayloadTooLarge { .. } => ErrorKind::Input,
            UnknownReviewType { .. }
            | EmptyPrompt { .. }
            | CredentialMissing { .. }
            | InvalidConfig(_) => ErrorKind::Configuration,
            RequestFailed { .. }
            | Timeout { .. }
            | RateLimitExceeded { .. }
            | AuthError { .. }
            | ApiError { .. }
            | Blocked { .. }
            | InvalidResponse { .. } => ErrorKind::Network,
            RenderFailed { .. } | OutputWriteFailed { .. } => ErrorKind::Render,
            Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether a retry of the same API call could succeed.
    ///
    /// Only rate limits, timeouts, transport failures and 5xx answers qualify.
    pub fn is_transient(&self) -> bool {
        match self {
            ReviewError::RateLimitExceeded { .. }
            | ReviewError::Timeout { .. }
            | ReviewError::RequestFailed { .. } => true,
            ReviewError::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_too_large_is_input_error() {
        let e = ReviewError::PayloadTooLarge {
            size: 30,
            limit: 20,
        };
        assert_eq!(e.kind(), ErrorKind::Input);
        assert!(e.to_string().contains("30 bytes"), "got: {e}");
    }

    #[test]
    fn credential_missing_is_configuration_error() {
        let e = ReviewError::CredentialMissing {
            hint: "Set GEMINI_API_KEY".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Configuration);
        assert!(e.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn rate_limit_display_with_retry() {
        let e = ReviewError::RateLimitExceeded {
            retry_after_secs: Some(60),
        };
        assert!(e.to_string().contains("retry after 60s"), "got: {e}");
        assert_eq!(e.kind(), ErrorKind::Network);
    }

    #[test]
    fn rate_limit_display_without_retry() {
        let e = ReviewError::RateLimitExceeded {
            retry_after_secs: None,
        };
        assert!(!e.to_string().contains("retry after"));
    }

    #[test]
    fn output_write_failed_is_render_error() {
        let e = ReviewError::OutputWriteFailed {
            path: PathBuf::from("/nope/report.pdf"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(e.kind(), ErrorKind::Render);
        assert_eq!(e.kind().exit_code(), 5);
    }

    #[test]
    fn exit_codes_are_distinct_and_non_zero() {
        let kinds = [
            ErrorKind::Input,
            ErrorKind::Configuration,
            ErrorKind::Network,
            ErrorKind::Render,
            ErrorKind::Internal,
        ];
        let mut codes: Vec<u8> = kinds.iter().map(|k| k.exit_code()).collect();
        assert!(codes.iter().all(|&c| c != 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn transient_classification() {
        assert!(ReviewError::Timeout { secs: 5 }.is_transient());
        assert!(ReviewError::ApiError {
            status: 503,
            message: "overloaded".into()
        }
        .is_transient());
        assert!(!ReviewError::ApiError {
            status: 400,
            message: "bad".into()
        }
        .is_transient());
        assert!(!ReviewError::AuthError {
            status: 403,
            detail: "denied".into()
        }
        .is_transient());
    }
}
