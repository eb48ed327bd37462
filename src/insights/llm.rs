use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::InsightsConfig;
use crate::providers::transport::{fetch_json, HttpRequest, Transport};
use crate::report::WalletReport;

use super::prompts::{analysis_prompt, SYSTEM_PROMPT};
use super::{InsightError, InsightGenerator};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
    Gemini,
}

impl LlmBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "anthropic" => Some(Self::Anthropic),
            "openai" => Some(Self::OpenAi),
            "gemini" => Some(Self::Gemini),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

/// Narrative generation through a hosted LLM: the Anthropic Messages API,
/// the OpenAI Chat Completions API or Gemini `generateContent`.
pub struct LlmInsights {
    transport: Arc<dyn Transport>,
    backend: LlmBackend,
    base_url: String,
    model: String,
    max_tokens: u32,
    api_key: Option<String>,
    timeout: Duration,
}

impl LlmInsights {
    pub fn from_config(transport: Arc<dyn Transport>, config: &InsightsConfig) -> Self {
        let backend = LlmBackend::from_name(&config.provider).unwrap_or(LlmBackend::Anthropic);
        let base_url = match backend {
            LlmBackend::Anthropic => &config.anthropic_base,
            LlmBackend::OpenAi => &config.openai_base,
            LlmBackend::Gemini => &config.gemini_base,
        };
        Self {
            transport,
            backend,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model_name().to_string(),
            max_tokens: config.max_tokens,
            api_key: config.api_key().map(str::to_string),
            timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    pub fn backend(&self) -> LlmBackend {
        self.backend
    }

    async fn call_anthropic(&self, key: &str, prompt: String) -> Result<String, InsightError> {
        let request = HttpRequest::post_json(
            format!("{}/v1/messages", self.base_url),
            json!({
                "model": self.model,
                "max_tokens": self.max_tokens,
                "system": SYSTEM_PROMPT,
                "messages": [{"role": "user", "content": prompt}],
            }),
        )
        .header("x-api-key", key)
        .header("anthropic-version", ANTHROPIC_VERSION);

        let response: MessagesResponse =
            fetch_json(self.transport.as_ref(), request, Instant::now() + self.timeout).await?;
        let text: String = response
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");
        non_empty(text, self.backend)
    }

    async fn call_openai(&self, key: &str, prompt: String) -> Result<String, InsightError> {
        let request = HttpRequest::post_json(
            format!("{}/v1/chat/completions", self.base_url),
            json!({
                "model": self.model,
                "max_tokens": self.max_tokens,
                "messages": [
                    {"role": "system", "content": SYSTEM_PROMPT},
                    {"role": "user", "content": prompt},
                ],
            }),
        )
        .header("Authorization", format!("Bearer {}", key));

        let response: ChatResponse =
            fetch_json(self.transport.as_ref(), request, Instant::now() + self.timeout).await?;
        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        non_empty(text, self.backend)
    }
}

impl LlmInsights {
    async fn call_gemini(&self, key: &str, prompt: String) -> Result<String, InsightError> {
        let request = HttpRequest::post_json(
            format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model),
            json!({
                "systemInstruction": {"parts": [{"text": SYSTEM_PROMPT}]},
                "contents": [{"role": "user", "parts": [{"text": prompt}]}],
                "generationConfig": {"maxOutputTokens": self.max_tokens},
            }),
        )
        .header("x-goog-api-key", key);

        let response: GenerateResponse =
            fetch_json(self.transport.as_ref(), request, Instant::now() + self.timeout).await?;
        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        non_empty(text, self.backend)
    }
}

fn non_empty(text: String, backend: LlmBackend) -> Result<String, InsightError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(InsightError::EmptyResponse(backend.as_str()))
    } else {
        Ok(trimmed.to_string())
    }
}

#[async_trait]
impl InsightGenerator for LlmInsights {
    async fn generate(&self, report: &WalletReport) -> Result<String, InsightError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(InsightError::MissingApiKey(self.backend.as_str()))?;
        let prompt = analysis_prompt(report)?;

        tracing::debug!(backend = self.backend.as_str(), model = %self.model, "Requesting insights");
        match self.backend {
            LlmBackend::Anthropic => self.call_anthropic(key, prompt).await,
            LlmBackend::OpenAi => self.call_openai(key, prompt).await,
            LlmBackend::Gemini => self.call_gemini(key, prompt).await,
        }
    }
}
