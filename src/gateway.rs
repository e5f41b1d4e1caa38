//! Model gateway: one accounting wrapper around the external vision/text model.
//!
//! Prompts live in [`crate::prompts`] and
//! JSON recovery in [`crate::pipeline::repair`]. The gateway adds exactly two
//! things on top of a raw model call: usage accounting and parse-with-repair.
//!
//! ## No retries
//!
//! A failed call surfaces as [`QuizError::ModelCall`] immediately. Whether to
//! retry, skip or abort is the driver's decision: extraction aborts the range,
//! backfill logs and moves on.
//!
//! ## Construction
//!
//! The gateway is built once and handed to the drivers. [`ModelGateway::from_config`]
//! checks the provider's credential up front, so a missing API key fails before
//! any page is rendered.

use crate::config::GatewayConfig;
use crate::error::QuizError;
use crate::pipeline::encode::PageImage;
use crate::pipeline::repair::repair_json;
use crate::usage::{Pricing, TokenUsage, UsageMeter};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// One part of the single user message sent per call.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    /// Base64 payload plus its MIME type.
    InlineData { data: String, mime_type: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub model: String,
    pub parts: Vec<Part>,
    /// Ask the model for a JSON object response.
    pub json_output: bool,
}

impl ModelRequest {
    /// Concatenated text parts.
    pub fn prompt_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::InlineData { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn image_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, Part::InlineData { .. }))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub text: String,
    pub usage: TokenUsage,
}

/// The opaque model capability: image(s) + prompt in, text + usage out.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn complete(&self, request: ModelRequest) -> Result<ModelReply, QuizError>;
}

// ── edgequake-llm backend ────────────────────────────────────────────────

/// System message sent with JSON requests. Not every provider exposes a
/// structured-output switch, so the hint travels as text.
const JSON_ONLY_INSTRUCTION: &str =
    "Respond with a single valid JSON object and nothing else. Do not wrap it in Markdown.";

/// [`ModelBackend`] over any `edgequake_llm` provider.
pub struct LlmBackend {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
}

impl LlmBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            provider,
            temperature,
            max_tokens,
        }
    }
}

#[async_trait]
impl ModelBackend for LlmBackend {
    async fn complete(&self, request: ModelRequest) -> Result<ModelReply, QuizError> {
        let start = Instant::now();
        let prompt = request.prompt_text();
        let images: Vec<ImageData> = request
            .parts
            .into_iter()
            .filter_map(|p| match p {
                Part::InlineData { data, mime_type } => {
                    Some(ImageData::new(data, mime_type).with_detail("high"))
                }
                Part::Text(_) => None,
            })
            .collect();

        let mut messages = Vec::with_capacity(2);
        if request.json_output {
            messages.push(ChatMessage::system(JSON_ONLY_INSTRUCTION));
        }
        messages.push(if images.is_empty() {
            ChatMessage::user(prompt)
        } else {
            ChatMessage::user_with_images(prompt, images)
        });

        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| QuizError::ModelCall {
                message: e.to_string(),
            })?;

        let prompt_tokens = response.prompt_tokens as u64;
        let completion_tokens = response.completion_tokens as u64;
        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            request.model,
            prompt_tokens,
            completion_tokens,
            start.elapsed()
        );

        Ok(ModelReply {
            text: response.content,
            usage: reported_usage(
                prompt_tokens,
                completion_tokens,
                response.total_tokens as u64,
            ),
        })
    }
}

/// Usage as reported by the provider. The reported total can exceed
/// prompt + completion (thinking tokens); it is only recomputed when the
/// provider leaves it at zero.
fn reported_usage(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> TokenUsage {
    let total_tokens = if total_tokens == 0 {
        prompt_tokens + completion_tokens
    } else {
        total_tokens
    };
    TokenUsage::new(prompt_tokens, completion_tokens, total_tokens)
}

// ── Credentials ──────────────────────────────────────────────────────────

/// API-key variables accepted per provider. Providers not listed need none.
const CREDENTIAL_VARS: &[(&str, &[&str])] = &[
    ("gemini", &["GEMINI_API_KEY", "GOOGLE_API_KEY"]),
    ("openai", &["OPENAI_API_KEY"]),
    ("anthropic", &["ANTHROPIC_API_KEY"]),
    ("mistral", &["MISTRAL_API_KEY"]),
    ("openrouter", &["OPENROUTER_API_KEY"]),
    ("xai", &["XAI_API_KEY"]),
];

/// Fail with [`QuizError::Configuration`] unless `provider`'s credential is set.
fn check_credential(
    provider: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), QuizError> {
    let Some((_, vars)) = CREDENTIAL_VARS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(provider))
    else {
        return Ok(());
    };

    let present = vars
        .iter()
        .any(|var| lookup(*var).is_some_and(|v| !v.trim().is_empty()));

    if present {
        Ok(())
    } else {
        Err(QuizError::Configuration {
            provider: provider.to_string(),
            hint: format!("Set {} to your API key.", vars.join(" or ")),
        })
    }
}

// ── Gateway ──────────────────────────────────────────────────────────────

/// Accounting wrapper around one model backend and one model identifier.
pub struct ModelGateway {
    backend: Arc<dyn ModelBackend>,
    model: String,
    pricing: Pricing,
    usage: UsageMeter,
}

impl ModelGateway {
    /// Wrap an existing backend.
    pub fn new(backend: Arc<dyn ModelBackend>, model: impl Into<String>, pricing: Pricing) -> Self {
        Self {
            backend,
            model: model.into(),
            pricing,
            usage: UsageMeter::new(),
        }
    }

    /// Build a gateway from config, validating the credential now rather than at first use.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, QuizError> {
        let provider = match config.provider {
            Some(ref provider) => Arc::clone(provider),
            None => {
                check_credential(&config.provider_name, |var| std::env::var(var).ok())?;
                ProviderFactory::create_llm_provider(&config.provider_name, &config.model)
                    .map_err(|e| QuizError::Configuration {
                        provider: config.provider_name.clone(),
                        hint: format!("{e}"),
                    })?
            }
        };

        let backend = LlmBackend::new(provider, config.temperature, config.max_tokens);
        Ok(Self::new(
            Arc::new(backend),
            config.model.clone(),
            config.pricing(),
        ))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn pricing(&self) -> Pricing {
        self.pricing
    }

    /// Cumulative usage of every successful call since construction or the last reset.
    pub fn usage(&self) -> TokenUsage {
        self.usage.snapshot()
    }

    pub fn reset_usage(&self) {
        self.usage.reset();
    }

    /// Estimated dollar cost of [`Self::usage`].
    pub fn estimated_cost(&self) -> f64 {
        self.pricing.estimate(&self.usage())
    }

    /// Single image + instruction.
    pub async fn generate_with_image(
        &self,
        image: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<(String, TokenUsage), QuizError> {
        self.generate_with_images(&[(image, mime_type)], prompt).await
    }

    /// Several images, in order, followed by the instruction.
    pub async fn generate_with_images(
        &self,
        images: &[(&[u8], &str)],
        prompt: &str,
    ) -> Result<(String, TokenUsage), QuizError> {
        let mut parts: Vec<Part> = images
            .iter()
            .map(|(bytes, mime_type)| Part::InlineData {
                data: STANDARD.encode(bytes),
                mime_type: mime_type.to_string(),
            })
            .collect();
        parts.push(Part::Text(prompt.to_string()));
        self.call(parts, true).await
    }

    /// Text-only prompt with no structured-output hint.
    pub async fn generate_text(&self, prompt: &str) -> Result<(String, TokenUsage), QuizError> {
        self.call(vec![Part::Text(prompt.to_string())], false).await
    }

    /// Text prompt whose reply is decoded as JSON, with one repair pass on failure.
    pub async fn generate_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
    ) -> Result<(T, TokenUsage), QuizError> {
        let (text, usage) = self.call(vec![Part::Text(prompt.to_string())], true).await?;
        Ok((parse_model_json(&text)?, usage))
    }

    /// Page image + prompt whose reply is decoded as JSON, with one repair pass on failure.
    pub async fn generate_json_with_image<T: DeserializeOwned>(
        &self,
        page: &PageImage,
        prompt: &str,
    ) -> Result<(T, TokenUsage), QuizError> {
        let parts = vec![
            Part::InlineData {
                data: page.to_base64(),
                mime_type: page.mime_type().to_string(),
            },
            Part::Text(prompt.to_string()),
        ];
        let (text, usage) = self.call(parts, true).await?;
        Ok((parse_model_json(&text)?, usage))
    }

    async fn call(&self, parts: Vec<Part>, json_output: bool) -> Result<(String, TokenUsage), QuizError> {
        let request = ModelRequest {
            model: self.model.clone(),
            parts,
            json_output,
        };
        let reply = self.backend.complete(request).await?;
        self.usage.record(reply.usage);
        Ok((reply.text, reply.usage))
    }
}

/// Decode model text as JSON; on failure run [`repair_json`] once and retry.
pub fn parse_model_json<T: DeserializeOwned>(raw: &str) -> Result<T, QuizError> {
    match serde_json::from_str(raw) {
        Ok(value) => Ok(value),
        Err(first) => {
            debug!("Model output failed to parse ({}), attempting repair", first);
            serde_json::from_str(&repair_json(raw)).map_err(|e| {
                warn!("Model output still invalid after repair: {}", e);
                QuizError::output_parse(e.to_string(), raw)
            })
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted in-memory backend shared by unit tests.

    use super::*;
    use std::sync::Mutex;

    type Responder = dyn Fn(usize, &ModelRequest) -> Result<String, QuizError> + Send + Sync;

    pub(crate) struct ScriptedBackend {
        respond: Box<Responder>,
        usage: TokenUsage,
        pub(crate) requests: Mutex<Vec<ModelRequest>>,
    }

    impl ScriptedBackend {
        /// `respond(call_index, request)` produces each reply; every success costs `usage`.
        pub(crate) fn new(
            usage: TokenUsage,
            respond: impl Fn(usize, &ModelRequest) -> Result<String, QuizError> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                respond: Box::new(respond),
                usage,
                requests: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ModelBackend for ScriptedBackend {
        async fn complete(&self, request: ModelRequest) -> Result<ModelReply, QuizError> {
            let index = {
                let mut requests = self.requests.lock().unwrap();
                requests.push(request.clone());
                requests.len() - 1
            };
            let text = (self.respond)(index, &request)?;
            Ok(ModelReply {
                text,
                usage: self.usage,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::ScriptedBackend;
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Reply {
        explanation: String,
    }

    #[test]
    fn reported_total_wins_over_sum() {
        assert_eq!(reported_usage(100, 40, 390), TokenUsage::new(100, 40, 390));
        assert_eq!(reported_usage(100, 40, 0), TokenUsage::new(100, 40, 140));
    }

    fn gateway(backend: Arc<ScriptedBackend>) -> ModelGateway {
        ModelGateway::new(backend, "test-model", Pricing::default())
    }

    #[tokio::test]
    async fn usage_accumulates_across_calls() {
        let backend = ScriptedBackend::new(TokenUsage::new(100, 50, 150), |_, _| Ok("ok".into()));
        let gw = gateway(backend.clone());

        gw.generate_text("one").await.unwrap();
        gw.generate_with_image(b"png", "image/png", "two").await.unwrap();

        assert_eq!(gw.usage(), TokenUsage::new(200, 100, 300));
        assert!((gw.estimated_cost() - (200.0 * 0.30 + 100.0 * 2.50) / 1e6).abs() < 1e-12);

        gw.reset_usage();
        assert_eq!(gw.usage(), TokenUsage::ZERO);
    }

    #[tokio::test]
    async fn failed_call_records_no_usage() {
        let backend = ScriptedBackend::new(TokenUsage::new(10, 10, 20), |_, _| {
            Err(QuizError::ModelCall {
                message: "503 unavailable".into(),
            })
        });
        let gw = gateway(backend);
        let err = gw.generate_text("x").await.unwrap_err();
        assert!(matches!(err, QuizError::ModelCall { .. }));
        assert_eq!(gw.usage(), TokenUsage::ZERO);
    }

    #[tokio::test]
    async fn request_shapes() {
        let backend = ScriptedBackend::new(TokenUsage::ZERO, |_, _| Ok("{}".into()));
        let gw = gateway(backend.clone());

        gw.generate_text("plain").await.unwrap();
        let images: [(&[u8], &str); 2] = [(b"a".as_slice(), "image/png"), (b"b".as_slice(), "image/jpeg")];
        gw.generate_with_images(&images, "look")
            .await
            .unwrap();

        let requests = backend.requests.lock().unwrap();
        assert!(!requests[0].json_output);
        assert_eq!(requests[0].model, "test-model");
        assert_eq!(requests[0].prompt_text(), "plain");

        assert!(requests[1].json_output);
        assert_eq!(requests[1].image_count(), 2);
        assert_eq!(
            requests[1].parts[1],
            Part::InlineData {
                data: STANDARD.encode(b"b"),
                mime_type: "image/jpeg".into()
            }
        );
        assert_eq!(requests[1].parts[2], Part::Text("look".into()));
    }

    #[tokio::test]
    async fn generate_json_repairs_fenced_output() {
        let backend = ScriptedBackend::new(TokenUsage::new(1, 1, 2), |_, _| {
            Ok("```json\n{\"explanation\": \"first\nsecond\"}\n```".into())
        });
        let gw = gateway(backend);
        let (reply, usage): (Reply, _) = gw.generate_json("explain").await.unwrap();
        assert_eq!(reply.explanation, "first\nsecond");
        assert_eq!(usage, TokenUsage::new(1, 1, 2));
    }

    #[tokio::test]
    async fn generate_json_unrepairable_is_parse_error_but_counts_usage() {
        let backend =
            ScriptedBackend::new(TokenUsage::new(5, 5, 10), |_, _| Ok("Sorry, I can't help.".into()));
        let gw = gateway(backend);
        let err = gw.generate_json::<Reply>("explain").await.unwrap_err();
        match err {
            QuizError::ModelOutputParse { snippet, .. } => {
                assert_eq!(snippet, "Sorry, I can't help.")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(gw.usage().total_tokens, 10);
    }

    #[test]
    fn blocking_use_from_sync_context() {
        let backend = ScriptedBackend::new(TokenUsage::ZERO, |i, _| Ok(format!("reply {i}")));
        let gw = gateway(backend);
        let (text, _) = tokio_test::block_on(gw.generate_text("hi")).unwrap();
        assert_eq!(text, "reply 0");
    }

    #[test]
    fn credential_check() {
        let none = |_: &str| None;
        let err = check_credential("gemini", none).unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));

        let google = |var: &str| (var == "GOOGLE_API_KEY").then(|| "k".to_string());
        assert!(check_credential("gemini", google).is_ok());

        let blank = |_: &str| Some("  ".to_string());
        assert!(check_credential("openai", blank).is_err());

        assert!(check_credential("ollama", none).is_ok());
    }
}
