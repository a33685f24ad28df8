//! Text generation: one prompt in, one text response out.
//!
//! [`TextGenerator`] is the seam between extraction and the external
//! model. Two implementations ship:
//!
//! * [`GeminiGenerator`]: the Generative Language REST API, keyed by an
//!   explicitly configured API key.
//! * [`LlmProviderGenerator`]: any `edgequake_llm` provider (OpenAI,
//!   Anthropic, Ollama, ...), resolved by name through `ProviderFactory`.
//!
//! Both are wrapped in [`RetryingGenerator`], which bounds every call with a
//! timeout and retries failures with exponential backoff
//! (`retry_backoff_ms * 2^attempt`).

use crate::config::IngestConfig;
use crate::error::ReceiptError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// A synchronous request/response text-completion service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ReceiptError>;
}

/// Build the generator described by `config`, wrapped with timeout and
/// retries.
pub fn resolve_generator(config: &IngestConfig) -> Result<Arc<dyn TextGenerator>, ReceiptError> {
    let inner: Arc<dyn TextGenerator> = if let Some(generator) = &config.generator {
        Arc::clone(generator)
    } else if config.provider_name.eq_ignore_ascii_case("gemini") {
        let key = config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ReceiptError::ProviderNotConfigured {
                provider: "gemini".into(),
                hint: "Set GEMINI_API_KEY or pass --api-key.".into(),
            })?;
        Arc::new(GeminiGenerator::new(
            key,
            &config.model,
            config.temperature,
            config.max_tokens,
        ))
    } else {
        Arc::new(LlmProviderGenerator::from_factory(
            &config.provider_name,
            &config.model,
            config.temperature,
            config.max_tokens,
        )?)
    };

    Ok(Arc::new(RetryingGenerator::new(
        inner,
        service_label(config),
        Duration::from_secs(config.api_timeout_secs),
        config.max_retries,
        Duration::from_millis(config.retry_backoff_ms),
    )))
}

fn service_label(config: &IngestConfig) -> String {
    if config.generator.is_some() {
        "Text generation".to_string()
    } else if config.provider_name.eq_ignore_ascii_case("gemini") {
        "Gemini".to_string()
    } else {
        config.provider_name.clone()
    }
}

// ── Gemini REST ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
    #[serde(default)]
    prompt_feedback: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

/// [`TextGenerator`] over the Gemini `generateContent` endpoint.
pub struct GeminiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
}

impl GeminiGenerator {
    pub fn new(api_key: &str, model: &str, temperature: f32, max_tokens: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: GEMINI_BASE_URL.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature,
            max_tokens,
        }
    }

    /// Point the generator at another endpoint root (a proxy or a local
    /// test server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request_body<'a>(&self, prompt: &'a str) -> GenerateContentRequest<'a> {
        GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_tokens,
            },
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ReceiptError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let res = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| ReceiptError::upstream("Gemini", e.without_url().to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ReceiptError::upstream(
                "Gemini",
                format!("status {status}: {}", body.trim()),
            ));
        }

        let body: GenerateContentResponse = res
            .json()
            .await
            .map_err(|e| ReceiptError::upstream("Gemini", format!("unreadable response: {e}")))?;
        response_text(body)
    }
}

/// Concatenated text parts of the first candidate.
fn response_text(body: GenerateContentResponse) -> Result<String, ReceiptError> {
    let Some(candidate) = body.candidates.into_iter().next() else {
        let detail = match body.prompt_feedback {
            Some(feedback) => format!("no candidates returned (feedback: {feedback})"),
            None => "no candidates returned".to_string(),
        };
        return Err(ReceiptError::upstream("Gemini", detail));
    };
    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    Ok(text)
}

// ── edgequake-llm providers ──────────────────────────────────────────────

/// [`TextGenerator`] over an `edgequake_llm` chat provider.
pub struct LlmProviderGenerator {
    provider: Arc<dyn LLMProvider>,
    label: String,
    options: CompletionOptions,
}

impl LlmProviderGenerator {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        label: impl Into<String>,
        temperature: f32,
        max_tokens: usize,
    ) -> Self {
        Self {
            provider,
            label: label.into(),
            options: CompletionOptions {
                temperature: Some(temperature),
                max_tokens: Some(max_tokens),
                ..Default::default()
            },
        }
    }

    /// Instantiate a named provider; credentials come from the provider's
    /// own environment variables.
    pub fn from_factory(
        provider_name: &str,
        model: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<Self, ReceiptError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            ReceiptError::ProviderNotConfigured {
                provider: provider_name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider, provider_name, temperature, max_tokens))
    }
}

#[async_trait]
impl TextGenerator for LlmProviderGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ReceiptError> {
        let messages = vec![ChatMessage::user(prompt)];
        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| ReceiptError::upstream(&self.label, e.to_string()))?;
        debug!(
            "{}: {} input tokens, {} output tokens",
            self.label, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

// ── Timeout + retry ──────────────────────────────────────────────────────

/// Bounds each call with a timeout and retries failures.
pub struct RetryingGenerator {
    inner: Arc<dyn TextGenerator>,
    service: String,
    timeout: Duration,
    max_retries: u32,
    backoff: Duration,
}

impl RetryingGenerator {
    pub fn new(
        inner: Arc<dyn TextGenerator>,
        service: impl Into<String>,
        timeout: Duration,
        max_retries: u32,
        backoff: Duration,
    ) -> Self {
        Self {
            inner,
            service: service.into(),
            timeout,
            max_retries,
            backoff,
        }
    }
}

#[async_trait]
impl TextGenerator for RetryingGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ReceiptError> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let wait = self.backoff * 2u32.pow(attempt - 1);
                warn!(
                    "{}: retry {}/{} after {:?}",
                    self.service, attempt, self.max_retries, wait
                );
                sleep(wait).await;
            }

            match tokio::time::timeout(self.timeout, self.inner.generate(prompt)).await {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(e)) => {
                    warn!("{}: attempt {} failed: {}", self.service, attempt + 1, e);
                    last_err = Some(e);
                }
                Err(_) => {
                    warn!(
                        "{}: attempt {} timed out after {:?}",
                        self.service,
                        attempt + 1,
                        self.timeout
                    );
                    last_err = Some(ReceiptError::UpstreamTimeout {
                        service: self.service.clone(),
                        secs: self.timeout.as_secs(),
                    });
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ReceiptError::upstream(&self.service, "no attempt made")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl TextGenerator for Flaky {
        async fn generate(&self, prompt: &str) -> Result<String, ReceiptError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(ReceiptError::upstream("Fake", "503 overloaded"))
            } else {
                Ok(format!("echo: {prompt}"))
            }
        }
    }

    struct Stalled;

    #[async_trait]
    impl TextGenerator for Stalled {
        async fn generate(&self, _prompt: &str) -> Result<String, ReceiptError> {
            sleep(Duration::from_secs(30)).await;
            Ok(String::new())
        }
    }

    fn retrying(inner: Arc<dyn TextGenerator>, retries: u32) -> RetryingGenerator {
        RetryingGenerator::new(
            inner,
            "Fake",
            Duration::from_millis(200),
            retries,
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failure() {
        let flaky = Arc::new(Flaky {
            failures: 1,
            calls: AtomicU32::new(0),
        });
        let gen = retrying(flaky.clone(), 1);
        assert_eq!(gen.generate("hi").await.unwrap(), "echo: hi");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retries_exhausted_returns_last_error() {
        let flaky = Arc::new(Flaky {
            failures: 5,
            calls: AtomicU32::new(0),
        });
        let err = retrying(flaky.clone(), 2).generate("hi").await.unwrap_err();
        assert!(err.is_upstream());
        assert!(err.to_string().contains("503"));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn timeout_is_reported_as_upstream_timeout() {
        let err = retrying(Arc::new(Stalled), 0).generate("hi").await.unwrap_err();
        assert!(matches!(err, ReceiptError::UpstreamTimeout { .. }));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn gemini_requires_api_key() {
        let config = IngestConfig::default();
        let err = resolve_generator(&config).err().unwrap();
        assert!(matches!(err, ReceiptError::ProviderNotConfigured { .. }));
    }

    #[test]
    fn prebuilt_generator_wins() {
        let config = IngestConfig::builder()
            .generator(Arc::new(Stalled))
            .build()
            .unwrap();
        assert!(resolve_generator(&config).is_ok());
    }

    #[test]
    fn gemini_request_body_shape() {
        let gen = GeminiGenerator::new("k", "gemini-1.5-flash-latest", 0.1, 2048);
        let body = serde_json::to_value(gen.request_body("Total: 450")).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Total: 450");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2048);
    }

    #[test]
    fn gemini_response_text_joins_parts() {
        let body: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{ "text": "[{\"type\":" }, { "text": "\"expense\"}]" }] } }]
        }))
        .unwrap();
        assert_eq!(response_text(body).unwrap(), "[{\"type\":\"expense\"}]");
    }

    #[test]
    fn gemini_blocked_prompt_is_upstream_error() {
        let body: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();
        let err = response_text(body).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }
}
