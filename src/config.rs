//! Configuration types for a drawing review.
//!
//! All review behaviour is controlled through [`ReviewConfig`], built via
//! [`ReviewConfigBuilder`]. The builder validates cross-field constraints
//! (a `Custom` review needs prompt text, limits must be non-zero) so the
//! pipeline itself never sees an inconsistent configuration.

use crate::error::ReviewError;
use crate::progress::ProgressCallback;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Default Gemini REST endpoint (v1beta carries `inlineData` PDF support).
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default multimodal model.
pub const DEFAULT_MODEL: &str = "gemini-1.5-pro";

/// Inline request limit of the Gemini API, applied to the raw document.
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 20 * 1024 * 1024;

/// Environment variables searched for the API key, in order.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_API_KEY"];

/// Configuration for one review run.
///
/// # Example
/// ```rust
/// use archopinion::{ReviewConfig, ReviewType};
///
/// let config = ReviewConfig::builder()
///     .review_type(ReviewType::BuildingRegs)
///     .api_key("test-key")
///     .api_timeout_secs(120)
///     .build()
///     .unwrap();
/// assert_eq!(config.review_type, ReviewType::BuildingRegs);
/// ```
#[derive(Clone)]
pub struct ReviewConfig {
    /// Which compliance prompt to send. Default: [`ReviewType::Nppf`].
    pub review_type: ReviewType,

    /// Prompt text for [`ReviewType::Custom`]. Ignored for the fixed types.
    pub custom_prompt: Option<String>,

    /// Project details sent alongside the prompt and printed on the report.
    pub project: ProjectInfo,

    /// Free-text instructions from the user, appended as context.
    pub instructions: Option<String>,

    /// API credential. If None, resolved from the environment at run time.
    pub api_key: Option<ApiKey>,

    /// dotenv-format file searched for the key when the environment has none.
    pub env_file: Option<std::path::PathBuf>,

    /// Gemini model identifier. Default: `gemini-1.5-pro`.
    pub model: String,

    /// Base URL of the Gemini REST API, without a trailing slash.
    pub api_base_url: String,

    /// Sampling temperature. Default: 0.2.
    ///
    /// Compliance reviews should quote dimensions and policies, not invent
    /// them; a low temperature keeps the model close to the drawings.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 8192.
    pub max_output_tokens: u32,

    /// Per-call timeout for the API request in seconds. Default: 180.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Largest document accepted before any network call. Default: 20 MiB.
    pub max_document_bytes: usize,

    /// Retries on transient API failures. Default: 0 (fail on first error).
    ///
    /// Retrying a paid API is a cost decision, so it is opt-in.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 1000.
    pub retry_backoff_ms: u64,

    /// Ask the model for Markdown sections or a JSON object. Default: Markdown.
    pub response_format: ResponseFormat,

    /// How the model's answer is split into report sections. Default: Auto.
    pub section_rule: SectionRule,

    /// Heading printed at the top of the report.
    pub report_title: String,

    /// Append the "not professional advice" disclaimer. Default: true.
    pub include_disclaimer: bool,

    /// Optional per-stage progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            review_type: ReviewType::default(),
            custom_prompt: None,
            project: ProjectInfo::default(),
            instructions: None,
            api_key: None,
            env_file: None,
            model: DEFAULT_MODEL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            temperature: 0.2,
            max_output_tokens: 8192,
            api_timeout_secs: 180,
            download_timeout_secs: 120,
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            max_retries: 0,
            retry_backoff_ms: 1000,
            response_format: ResponseFormat::default(),
            section_rule: SectionRule::default(),
            report_title: "Architectural Compliance Review".to_string(),
            include_disclaimer: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ReviewConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReviewConfig")
            .field("review_type", &self.review_type)
            .field("custom_prompt", &self.custom_prompt.as_ref().map(|p| p.len()))
            .field("project", &self.project)
            .field("api_key", &self.api_key)
            .field("env_file", &self.env_file)
            .field("model", &self.model)
            .field("api_base_url", &self.api_base_url)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_document_bytes", &self.max_document_bytes)
            .field("max_retries", &self.max_retries)
            .field("response_format", &self.response_format)
            .field("section_rule", &self.section_rule)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ReviewProgressCallback>"),
            )
            .finish()
    }
}

impl ReviewConfig {
    /// Create a new builder for `ReviewConfig`.
    pub fn builder() -> ReviewConfigBuilder {
        ReviewConfigBuilder {
            config: Self::default(),
        }
    }

    /// The API key from the config, the environment, or the env file.
    ///
    /// Called before the document is read so a missing key fails fast.
    pub fn resolve_api_key(&self) -> Result<ApiKey, ReviewError> {
        resolve_api_key_with(
            self.api_key.as_ref(),
            |name| std::env::var(name).ok(),
            self.env_file.as_deref(),
        )
    }
}

/// Builder for [`ReviewConfig`].
#[derive(Debug)]
pub struct ReviewConfigBuilder {
    config: ReviewConfig,
}

impl ReviewConfigBuilder {
    pub fn review_type(mut self, review_type: ReviewType) -> Self {
        self.config.review_type = review_type;
        self
    }

    pub fn custom_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.custom_prompt = Some(prompt.into());
        self
    }

    pub fn project(mut self, project: ProjectInfo) -> Self {
        self.config.project = project;
        self
    }

    pub fn instructions(mut self, text: impl Into<String>) -> Self {
        self.config.instructions = Some(text.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(ApiKey::new(key));
        self
    }

    pub fn env_file(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.config.env_file = Some(path.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_output_tokens(mut self, n: u32) -> Self {
        self.config.max_output_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_document_bytes(mut self, bytes: usize) -> Self {
        self.config.max_document_bytes = bytes;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn response_format(mut self, format: ResponseFormat) -> Self {
        self.config.response_format = format;
        self
    }

    pub fn section_rule(mut self, rule: SectionRule) -> Self {
        self.config.section_rule = rule;
        self
    }

    pub fn report_title(mut self, title: impl Into<String>) -> Self {
        self.config.report_title = title.into();
        self
    }

    pub fn include_disclaimer(mut self, v: bool) -> Self {
        self.config.include_disclaimer = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ReviewConfig, ReviewError> {
        let c = &self.config;
        if c.review_type == ReviewType::Custom
            && c.custom_prompt.as_deref().map_or(true, |p| p.trim().is_empty())
        {
            return Err(ReviewError::EmptyPrompt {
                review_type: c.review_type.to_string(),
            });
        }
        if c.model.trim().is_empty() {
            return Err(ReviewError::InvalidConfig("model must not be empty".into()));
        }
        if c.max_document_bytes == 0 {
            return Err(ReviewError::InvalidConfig(
                "max_document_bytes must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(ReviewError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.max_output_tokens == 0 {
            return Err(ReviewError::InvalidConfig(
                "max_output_tokens must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Credentials ──────────────────────────────────────────────────────────

/// A Gemini API key. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into().trim().to_string())
    }

    /// The raw secret, for the request header only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey(<{} chars redacted>)", self.0.len())
    }
}

/// Resolve the key: explicit value, then environment, then the env file.
fn resolve_api_key_with(
    explicit: Option<&ApiKey>,
    lookup: impl Fn(&str) -> Option<String>,
    env_file: Option<&Path>,
) -> Result<ApiKey, ReviewError> {
    if let Some(key) = explicit.filter(|k| !k.is_empty()) {
        return Ok(key.clone());
    }

    for name in API_KEY_ENV_VARS {
        if let Some(value) = lookup(name).filter(|v| !v.trim().is_empty()) {
            return Ok(ApiKey::new(value));
        }
    }

    if let Some(path) = env_file {
        let entries = dotenvy::from_path_iter(path).map_err(|e| {
            ReviewError::InvalidConfig(format!(
                "cannot read configuration file '{}': {e}",
                path.display()
            ))
        })?;
        for entry in entries {
            let (name, value) = entry.map_err(|e| {
                ReviewError::InvalidConfig(format!(
                    "malformed configuration file '{}': {e}",
                    path.display()
                ))
            })?;
            if API_KEY_ENV_VARS.contains(&name.as_str()) && !value.trim().is_empty() {
                return Ok(ApiKey::new(value));
            }
        }
    }

    Err(ReviewError::CredentialMissing {
        hint: format!(
            "Set {} in the environment, add it to a .env file, or pass --api-key.",
            API_KEY_ENV_VARS[0]
        ),
    })
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Compliance focus of the review; each maps to one fixed prompt template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReviewType {
    /// National Planning Policy Framework. (default)
    #[default]
    Nppf,
    /// Local Plan / Local Development Framework policies.
    LocalPlan,
    /// Building Regulations (Approved Documents).
    BuildingRegs,
    /// Permitted Development Rights (GPDO 2015, Schedule 2).
    PermittedDevelopment,
    /// User-supplied prompt text.
    Custom,
}

impl ReviewType {
    pub const ALL: [ReviewType; 5] = [
        ReviewType::Nppf,
        ReviewType::LocalPlan,
        ReviewType::BuildingRegs,
        ReviewType::PermittedDevelopment,
        ReviewType::Custom,
    ];

    /// Human-readable framework name for the report.
    pub fn label(self) -> &'static str {
        match self {
            ReviewType::Nppf => "National Planning Policy Framework",
            ReviewType::LocalPlan => "Local Plan",
            ReviewType::BuildingRegs => "Building Regulations",
            ReviewType::PermittedDevelopment => "Permitted Development Rights",
            ReviewType::Custom => "Custom Review",
        }
    }
}

impl fmt::Display for ReviewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReviewType::Nppf => "nppf",
            ReviewType::LocalPlan => "local-plan",
            ReviewType::BuildingRegs => "building-regs",
            ReviewType::PermittedDevelopment => "pdr",
            ReviewType::Custom => "custom",
        };
        f.write_str(s)
    }
}

impl FromStr for ReviewType {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().to_lowercase().replace(['_', ' '], "-");
        match normalised.as_str() {
            "nppf" => Ok(ReviewType::Nppf),
            "local-plan" | "localplan" | "ldf" => Ok(ReviewType::LocalPlan),
            "building-regs" | "buildingregs" | "building-regulations" | "bre" => {
                Ok(ReviewType::BuildingRegs)
            }
            "pdr" | "permitted-development" => Ok(ReviewType::PermittedDevelopment),
            "custom" => Ok(ReviewType::Custom),
            _ => Err(ReviewError::UnknownReviewType {
                value: s.to_string(),
            }),
        }
    }
}

/// Project details collected from the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub address: Option<String>,
    pub project_type: Option<String>,
    pub council: Option<String>,
    pub planning_reference: Option<String>,
}

impl ProjectInfo {
    /// True when no field carries a value.
    pub fn is_empty(&self) -> bool {
        self.address.is_none()
            && self.project_type.is_none()
            && self.council.is_none()
            && self.planning_reference.is_none()
    }
}

/// Shape of the answer requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResponseFormat {
    /// Markdown with `##` section headings. (default)
    #[default]
    Markdown,
    /// A JSON object with framework, plan and policy arrays.
    Json,
}

/// File format of the written report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Paginated A4 PDF. (default)
    #[default]
    Pdf,
    /// Markdown document.
    Markdown,
    /// The report structure as pretty-printed JSON.
    Json,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Markdown => "md",
            OutputFormat::Json => "json",
        }
    }

    /// Infer the format from a path's extension, if recognised.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(OutputFormat::Pdf),
            "md" | "markdown" => Some(OutputFormat::Markdown),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

/// Rule used to split the model's answer into report sections.
///
/// Model output format is not guaranteed, so every rule falls back to a
/// single "Unstructured Output" section instead of failing.
#[derive(Debug, Clone, Default)]
pub enum SectionRule {
    /// JSON analysis if present, else Markdown headings, else title lines. (default)
    #[default]
    Auto,
    /// `#`–`######` headings and whole-line `**bold**` titles.
    MarkdownHeadings,
    /// Short capitalised lines without terminal punctuation.
    TitleLines,
    /// Blank-line-delimited blocks; first line of each block is the title.
    BlankLineBlocks,
    /// Lines matching the regex are titles; group 1 (or the line) is the title text.
    Pattern(Regex),
}

impl SectionRule {
    /// Build a [`SectionRule::Pattern`] from a user-supplied regex.
    pub fn pattern(re: &str) -> Result<Self, ReviewError> {
        Regex::new(re)
            .map(SectionRule::Pattern)
            .map_err(|e| ReviewError::InvalidConfig(format!("invalid section pattern: {e}")))
    }
}

impl FromStr for SectionRule {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(SectionRule::Auto),
            "headings" | "markdown" => Ok(SectionRule::MarkdownHeadings),
            "title-lines" | "titles" => Ok(SectionRule::TitleLines),
            "blank-lines" | "blocks" => Ok(SectionRule::BlankLineBlocks),
            other => Err(ReviewError::InvalidConfig(format!(
                "unknown section rule '{other}' (auto, headings, title-lines, blank-lines)"
            ))),
        }
    }
}
