//! Configuration types for the model gateway and both drivers.
//!
//! Each component takes one config struct built through a builder, so callers
//! set only what they care about and rely on documented defaults for the rest.
//! `build()` validates ranges and returns [`QuizError::InvalidConfig`].

use crate::error::QuizError;
use crate::progress::{BackfillProgress, ExtractionProgress};
use crate::usage::Pricing;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Default provider name passed to `edgequake_llm::ProviderFactory`.
pub const DEFAULT_PROVIDER: &str = "gemini";
/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

// ── Gateway ──────────────────────────────────────────────────────────────

/// Configuration for [`crate::gateway::ModelGateway`].
///
/// # Example
/// ```rust
/// use paper2quiz::GatewayConfig;
///
/// let config = GatewayConfig::builder()
///     .provider_name("openai")
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.pricing().input_per_million, 0.40);
/// ```
#[derive(Clone)]
pub struct GatewayConfig {
    /// Provider name, e.g. "gemini", "openai", "anthropic", "ollama". Default: "gemini".
    pub provider_name: String,

    /// Model identifier, fixed for the gateway's lifetime. Default: "gemini-2.5-flash".
    pub model: String,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Extraction is transcription; low temperature keeps the model faithful
    /// to the page.
    pub temperature: f32,

    /// Maximum output tokens per call. Default: 8192.
    ///
    /// A dense page with 10+ questions and long stems can exceed 4 000 tokens
    /// of JSON; truncated JSON cannot be repaired.
    pub max_tokens: usize,

    /// Price override. If None, looked up from the model name.
    pub pricing: Option<Pricing>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            provider_name: DEFAULT_PROVIDER.to_string(),
            model: DEFAULT_MODEL.to_string(),
            provider: None,
            temperature: 0.1,
            max_tokens: 8192,
            pricing: None,
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("pricing", &self.pricing)
            .finish()
    }
}

impl GatewayConfig {
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder {
            config: Self::default(),
        }
    }

    /// Effective pricing: explicit override, else the model's table entry.
    pub fn pricing(&self) -> Pricing {
        self.pricing.unwrap_or_else(|| Pricing::for_model(&self.model))
    }
}

#[derive(Debug)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = name.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
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

    pub fn pricing(mut self, pricing: Pricing) -> Self {
        self.config.pricing = Some(pricing);
        self
    }

    pub fn build(self) -> Result<GatewayConfig, QuizError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(QuizError::InvalidConfig("model must not be empty".into()));
        }
        if c.provider.is_none() && c.provider_name.trim().is_empty() {
            return Err(QuizError::InvalidConfig(
                "provider name must not be empty".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(QuizError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

// ── Extraction ───────────────────────────────────────────────────────────

/// Configuration for [`crate::extract::QuestionExtractor`].
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Render scale, a multiplier on pdfium's default resolution. Range 0.5–6.0. Default: 2.0.
    ///
    /// Higher scale means a larger image: small print and pencil marks become
    /// readable, at a higher per-page token cost.
    pub scale: f32,

    /// Delay between consecutive page requests, in milliseconds. Default: 100.
    pub page_delay_ms: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Timeout for downloading a URL input, in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-page progress events.
    pub progress_callback: Option<ExtractionProgress>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            scale: 2.0,
            page_delay_ms: 100,
            password: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("scale", &self.scale)
            .field("page_delay_ms", &self.page_delay_ms)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn scale(mut self, scale: f32) -> Self {
        self.config.scale = scale;
        self
    }

    pub fn page_delay_ms(mut self, ms: u64) -> Self {
        self.config.page_delay_ms = ms;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ExtractionProgress) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn build(self) -> Result<ExtractionConfig, QuizError> {
        let s = self.config.scale;
        if !(0.5..=6.0).contains(&s) {
            return Err(QuizError::InvalidConfig(format!(
                "render scale must be 0.5–6.0, got {}",
                s
            )));
        }
        Ok(self.config)
    }
}

// ── Backfill ─────────────────────────────────────────────────────────────

/// Configuration for [`crate::backfill::ExplanationBackfiller`].
#[derive(Clone)]
pub struct BackfillConfig {
    /// Checkpoint after every `batch_size` successful questions. Default: 10.
    pub batch_size: usize,

    /// Start from an existing checkpoint instead of the input, if one exists. Default: false.
    pub resume: bool,

    /// Leave questions that already have an explanation alone. Default: true.
    ///
    /// When false, existing explanations are regenerated and overwritten.
    pub skip_existing: bool,

    /// Delay between consecutive model calls, in milliseconds. Default: 0.
    pub request_delay_ms: u64,

    /// Per-question progress events.
    pub progress_callback: Option<BackfillProgress>,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            resume: false,
            skip_existing: true,
            request_delay_ms: 0,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BackfillConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackfillConfig")
            .field("batch_size", &self.batch_size)
            .field("resume", &self.resume)
            .field("skip_existing", &self.skip_existing)
            .field("request_delay_ms", &self.request_delay_ms)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl BackfillConfig {
    pub fn builder() -> BackfillConfigBuilder {
        BackfillConfigBuilder {
            config: Self::default(),
        }
    }
}

#[derive(Debug)]
pub struct BackfillConfigBuilder {
    config: BackfillConfig,
}

impl BackfillConfigBuilder {
    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n;
        self
    }

    pub fn resume(mut self, v: bool) -> Self {
        self.config.resume = v;
        self
    }

    pub fn skip_existing(mut self, v: bool) -> Self {
        self.config.skip_existing = v;
        self
    }

    pub fn request_delay_ms(mut self, ms: u64) -> Self {
        self.config.request_delay_ms = ms;
        self
    }

    pub fn progress_callback(mut self, cb: BackfillProgress) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn build(self) -> Result<BackfillConfig, QuizError> {
        if self.config.batch_size == 0 {
            return Err(QuizError::InvalidConfig("batch size must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}
