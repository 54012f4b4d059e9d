//! Configuration for reshape, classification and extraction runs.
//!
//! All behaviour is controlled through [`ClassifyConfig`], built via its
//! [`ClassifyConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across threads, serialise them for logging, and
//! diff two runs to understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A twenty-field constructor is unreadable and breaks on every new field.
//! The builder pattern lets callers set only what they care about and rely
//! on well-documented defaults for the rest.

use crate::error::TbClassifyError;
use crate::progress::ProcessProgressCallback;
use crate::taxonomy::Taxonomy;
use std::fmt;
use std::sync::Arc;

/// Shared handle to a progress callback.
pub type ProgressCallback = Arc<dyn ProcessProgressCallback>;

/// Default chat-completions endpoint (OpenAI).
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
/// Default vision-OCR endpoint (JigsawStack vOCR).
pub const DEFAULT_OCR_ENDPOINT: &str = "https://api.jigsawstack.com/v1/vision/vocr";
/// Default classification model.
pub const DEFAULT_MODEL: &str = "gpt-4-turbo";

/// Header keywords that identify the header row of a trial balance sheet.
pub const DEFAULT_HEADER_KEYWORDS: &[&str] = &[
    "Account Code",
    "Account",
    "Account Type",
    "Debit - Year to date",
];

/// Header renames applied after the header row is found.
pub const DEFAULT_HEADER_RENAMES: &[(&str, &str)] = &[
    ("Account", "Account Description"),
    ("Debit - Year to date", "Debit Amount"),
    ("Credit - Year to date", "Credit Amount"),
];

/// Configuration for a tb-classify run.
///
/// Built via [`ClassifyConfig::builder()`] or using
/// [`ClassifyConfig::default()`].
///
/// # Example
/// ```rust
/// use tb_classify::ClassifyConfig;
///
/// let config = ClassifyConfig::builder()
///     .model("gpt-4-turbo")
///     .batch_size(25)
///     .concurrency(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ClassifyConfig {
    /// Classification model identifier. Default: "gpt-4-turbo".
    pub model: String,

    /// Base URL of the OpenAI-compatible chat-completions API.
    /// Default: `https://api.openai.com/v1`.
    pub api_base: String,

    /// API key for the classification service. If None, read from
    /// `OPENAI_API_KEY` at call time.
    pub api_key: Option<String>,

    /// Endpoint of the vision-OCR service used for PDF extraction.
    /// Default: the JigsawStack vOCR endpoint.
    pub ocr_endpoint: String,

    /// API key for the OCR service. If None, read from
    /// `JIGSAWSTACK_API_KEY` at call time.
    pub ocr_api_key: Option<String>,

    /// Rows per classification request. Default: 40.
    ///
    /// One giant request risks truncated responses (the CSV must fit in the
    /// completion budget) and loses everything on a single failure. Batches
    /// of 40 keep each response well under `max_tokens` while leaving few
    /// enough requests that per-request overhead stays negligible.
    pub batch_size: usize,

    /// Number of concurrent classification requests. Default: 4.
    ///
    /// The API is network-bound; a handful of parallel calls cuts wall-clock
    /// time almost linearly. If you hit rate-limit errors (`429`), lower
    /// this.
    pub concurrency: usize,

    /// Sampling temperature for the completion. Default: 0.1.
    ///
    /// Low temperature makes the model deterministic and faithful to the
    /// taxonomy — exactly what you want for classification. Higher values
    /// introduce creativity that produces labels outside the hierarchy.
    pub temperature: f32,

    /// Maximum tokens the model may generate per batch. Default: 2048.
    ///
    /// Forty CSV lines of four labels run to roughly 1 200 tokens. Setting
    /// this too low silently truncates the response mid-line, which then
    /// surfaces as a `CountMismatch` batch error.
    pub max_tokens: usize,

    /// Maximum retry attempts on a transient API failure. Default: 3.
    ///
    /// Most 5xx and timeout errors are transient. Permanent errors (bad API
    /// key, 400) are not retried — they surface as a batch error
    /// immediately.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s, so N concurrent
    /// workers do not all retry against a recovering endpoint at once.
    pub retry_backoff_ms: u64,

    /// Taxonomy used for prompting and response validation. Default:
    /// the bundled chart of accounts.
    pub taxonomy: Taxonomy,

    /// Custom system prompt. If None, the built-in classification prompt
    /// (with the taxonomy embedded) is used.
    pub system_prompt: Option<String>,

    /// Custom OCR extraction prompt. If None, the built-in table prompt.
    pub ocr_prompt: Option<String>,

    /// Run the reshape transform before classification. Default: true.
    ///
    /// Disable when the workbook is already in the canonical layout and a
    /// second reshape would be a pointless (if harmless) pass.
    pub reshape_first: bool,

    /// Header keywords for header-row detection during reshape.
    pub header_keywords: Vec<String>,

    /// Header renames applied after the header row is found.
    pub header_renames: Vec<(String, String)>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-API-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Optional progress callback for batch-level events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            ocr_endpoint: DEFAULT_OCR_ENDPOINT.to_string(),
            ocr_api_key: None,
            batch_size: 40,
            concurrency: 4,
            temperature: 0.1,
            max_tokens: 2048,
            max_retries: 3,
            retry_backoff_ms: 500,
            taxonomy: Taxonomy::default(),
            system_prompt: None,
            ocr_prompt: None,
            reshape_first: true,
            header_keywords: DEFAULT_HEADER_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            header_renames: DEFAULT_HEADER_RENAMES
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
            download_timeout_secs: 120,
            api_timeout_secs: 60,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ClassifyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifyConfig")
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("ocr_endpoint", &self.ocr_endpoint)
            .field("ocr_api_key", &self.ocr_api_key.as_ref().map(|_| "<redacted>"))
            .field("batch_size", &self.batch_size)
            .field("concurrency", &self.concurrency)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("reshape_first", &self.reshape_first)
            .field("header_keywords", &self.header_keywords)
            .finish()
    }
}

impl ClassifyConfig {
    /// Create a new builder for `ClassifyConfig`.
    pub fn builder() -> ClassifyConfigBuilder {
        ClassifyConfigBuilder {
            config: Self::default(),
        }
    }

    /// The classification API key, falling back to `OPENAI_API_KEY`.
    pub fn resolve_api_key(&self) -> Result<String, TbClassifyError> {
        if let Some(ref k) = self.api_key {
            if !k.is_empty() {
                return Ok(k.clone());
            }
        }
        match std::env::var("OPENAI_API_KEY") {
            Ok(k) if !k.is_empty() => Ok(k),
            _ => Err(TbClassifyError::ClassifierNotConfigured),
        }
    }

    /// The OCR API key, falling back to `JIGSAWSTACK_API_KEY`.
    pub fn resolve_ocr_api_key(&self) -> Result<String, TbClassifyError> {
        if let Some(ref k) = self.ocr_api_key {
            if !k.is_empty() {
                return Ok(k.clone());
            }
        }
        match std::env::var("JIGSAWSTACK_API_KEY") {
            Ok(k) if !k.is_empty() => Ok(k),
            _ => Err(TbClassifyError::OcrNotConfigured),
        }
    }
}

/// Builder for [`ClassifyConfig`].
#[derive(Debug)]
pub struct ClassifyConfigBuilder {
    config: ClassifyConfig,
}

impl ClassifyConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.config.api_base = base.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn ocr_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.ocr_endpoint = endpoint.into();
        self
    }

    pub fn ocr_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.ocr_api_key = Some(key.into());
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n.max(1);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
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

    pub fn taxonomy(mut self, taxonomy: Taxonomy) -> Self {
        self.config.taxonomy = taxonomy;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn ocr_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.ocr_prompt = Some(prompt.into());
        self
    }

    pub fn reshape_first(mut self, v: bool) -> Self {
        self.config.reshape_first = v;
        self
    }

    pub fn header_keywords(mut self, keywords: Vec<String>) -> Self {
        self.config.header_keywords = keywords;
        self
    }

    pub fn header_renames(mut self, renames: Vec<(String, String)>) -> Self {
        self.config.header_renames = renames;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClassifyConfig, TbClassifyError> {
        let c = &self.config;
        if c.batch_size == 0 {
            return Err(TbClassifyError::InvalidConfig("batch_size must be ≥ 1".into()));
        }
        if c.concurrency == 0 {
            return Err(TbClassifyError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        if c.model.is_empty() {
            return Err(TbClassifyError::InvalidConfig("model must not be empty".into()));
        }
        if c.header_keywords.is_empty() {
            return Err(TbClassifyError::InvalidConfig(
                "header_keywords must not be empty".into(),
            ));
        }
        if c.taxonomy.is_empty() {
            return Err(TbClassifyError::InvalidConfig(
                "taxonomy must contain at least one account type".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds() {
        let c = ClassifyConfig::builder().build().unwrap();
        assert_eq!(c.model, DEFAULT_MODEL);
        assert_eq!(c.batch_size, 40);
        assert_eq!(c.concurrency, 4);
        assert!(c.reshape_first);
    }

    #[test]
    fn builder_clamps_degenerate_values() {
        let c = ClassifyConfig::builder()
            .batch_size(0)
            .concurrency(0)
            .temperature(9.0)
            .build()
            .unwrap();
        assert_eq!(c.batch_size, 1);
        assert_eq!(c.concurrency, 1);
        assert!((c.temperature - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn empty_model_rejected() {
        let err = ClassifyConfig::builder().model("").build();
        assert!(err.is_err());
    }

    #[test]
    fn empty_keywords_rejected() {
        let err = ClassifyConfig::builder().header_keywords(vec![]).build();
        assert!(err.is_err());
    }

    #[test]
    fn debug_redacts_keys() {
        let c = ClassifyConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("redacted"));
    }
}
