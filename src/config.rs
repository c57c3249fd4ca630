//! Configuration types for invoice extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. The same config drives page
//! extraction, merging and chat, so one value can be shared by an
//! [`crate::InvoiceExtractor`] and every request it makes.

use crate::error::InvoiceError;
use crate::progress::ProgressCallback;
use crate::transport::ModelTransport;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for extracting one or more invoices.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use invoice_vlm::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .model("llava:13b")
///     .max_attempts(5)
///     .build()
///     .unwrap();
/// assert_eq!(config.retry_delay_ms, 1000);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Base URL of the Ollama-compatible model service.
    /// Default: `http://localhost:11434`.
    pub base_url: String,

    /// Vision model used for extraction. Default: `llama3.2-vision`.
    pub model: String,

    /// Model used for chat questions. If None, uses [`Self::model`].
    pub chat_model: Option<String>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Extraction is transcription; a low temperature keeps the model close
    /// to what is printed on the page.
    pub temperature: f32,

    /// Maximum tokens the model may generate per request. Default: 2048.
    pub max_tokens: usize,

    /// Total attempts per page, including the first. Default: 3.
    pub max_attempts: u32,

    /// Fixed delay between attempts in milliseconds. Default: 1000.
    ///
    /// The delay does not grow between attempts and there is no delay after
    /// the last one.
    pub retry_delay_ms: u64,

    /// Per-attempt timeout in seconds. Default: None (wait indefinitely).
    ///
    /// Covers the whole attempt, including reading the streamed body.
    pub request_timeout_secs: Option<u64>,

    /// Number of pages in flight at once. Default: 1 (sequential).
    ///
    /// Results are always consumed in page order, so raising this does not
    /// change which value wins a merge.
    pub concurrency: usize,

    /// What to do when a page fails after all attempts. Default: Skip.
    pub page_failure: PageFailurePolicy,

    /// Which page wins when several pages carry the same field.
    /// Default: LastWins.
    pub merge_precedence: MergePrecedence,

    /// Downscale images over 10 MiB before upload. Default: true.
    pub optimise_images: bool,

    /// Custom extraction prompt. If None, uses the built-in prompt.
    ///
    /// A custom prompt must still ask for `Label: value` lines and the
    /// `Part 2 - Additional Information:` section, or parsing will find
    /// nothing.
    pub extraction_prompt: Option<String>,

    /// Pre-constructed transport. If None, an [`crate::OllamaTransport`]
    /// for [`Self::base_url`] is created.
    pub transport: Option<Arc<dyn ModelTransport>>,

    /// Progress callback. If None, events are dropped.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2-vision".to_string(),
            chat_model: None,
            temperature: 0.1,
            max_tokens: 2048,
            max_attempts: 3,
            retry_delay_ms: 1000,
            request_timeout_secs: None,
            concurrency: 1,
            page_failure: PageFailurePolicy::default(),
            merge_precedence: MergePrecedence::default(),
            optimise_images: true,
            extraction_prompt: None,
            transport: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("chat_model", &self.chat_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("page_failure", &self.page_failure)
            .field("merge_precedence", &self.merge_precedence)
            .field("optimise_images", &self.optimise_images)
            .field(
                "transport",
                &self.transport.as_ref().map(|_| "<dyn ModelTransport>"),
            )
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn callback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    pub(crate) fn chat_model_name(&self) -> &str {
        self.chat_model.as_deref().unwrap_or(&self.model)
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn chat_model(mut self, model: impl Into<String>) -> Self {
        self.config.chat_model = Some(model.into());
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

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_delay_ms = ms;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = Some(secs);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn page_failure(mut self, policy: PageFailurePolicy) -> Self {
        self.config.page_failure = policy;
        self
    }

    pub fn merge_precedence(mut self, precedence: MergePrecedence) -> Self {
        self.config.merge_precedence = precedence;
        self
    }

    pub fn optimise_images(mut self, v: bool) -> Self {
        self.config.optimise_images = v;
        self
    }

    pub fn extraction_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.extraction_prompt = Some(prompt.into());
        self
    }

    pub fn transport(mut self, transport: Arc<dyn ModelTransport>) -> Self {
        self.config.transport = Some(transport);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, InvoiceError> {
        let c = &self.config;
        if c.max_attempts == 0 {
            return Err(InvoiceError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(InvoiceError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(InvoiceError::InvalidConfig(format!(
                "base_url must start with http:// or https://, got {:?}",
                c.base_url
            )));
        }
        if c.model.trim().is_empty() {
            return Err(InvoiceError::InvalidConfig("Model name is empty".into()));
        }
        if c.request_timeout_secs == Some(0) {
            return Err(InvoiceError::InvalidConfig(
                "request_timeout_secs must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// What the driver does with a page that failed after all attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageFailurePolicy {
    /// Record the failure and merge the remaining pages. (default)
    #[default]
    Skip,
    /// Stop at the first failed page with [`InvoiceError::PageFailed`].
    Abort,
}

/// Which page's value survives when several pages carry the same field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MergePrecedence {
    /// A later page overwrites an earlier one. (default)
    #[default]
    LastWins,
    /// The first page that carries a field keeps it.
    FirstWins,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ExtractionConfig::default();
        assert_eq!(c.base_url, "http://localhost:11434");
        assert_eq!(c.model, "llama3.2-vision");
        assert_eq!(c.max_attempts, 3);
        assert_eq!(c.retry_delay_ms, 1000);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.page_failure, PageFailurePolicy::Skip);
        assert_eq!(c.merge_precedence, MergePrecedence::LastWins);
        assert!(c.request_timeout_secs.is_none());
    }

    #[test]
    fn rejects_zero_attempts() {
        let err = ExtractionConfig::builder().max_attempts(0).build().unwrap_err();
        assert!(matches!(err, InvoiceError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_zero_concurrency() {
        assert!(ExtractionConfig::builder().concurrency(0).build().is_err());
    }

    #[test]
    fn rejects_non_http_url() {
        let err = ExtractionConfig::builder()
            .base_url("localhost:11434")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn chat_model_falls_back_to_model() {
        let c = ExtractionConfig::builder().model("llava").build().unwrap();
        assert_eq!(c.chat_model_name(), "llava");
        let c = ExtractionConfig::builder()
            .model("llava")
            .chat_model("llama3.1")
            .build()
            .unwrap();
        assert_eq!(c.chat_model_name(), "llama3.1");
    }

    #[test]
    fn debug_hides_trait_objects() {
        let c = ExtractionConfig::builder()
            .progress_callback(Arc::new(crate::progress::NoopProgressCallback))
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("<dyn callback>"));
    }
}
