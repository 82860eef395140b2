//! Model-failover LLM client for OpenAI-compatible endpoints.
//!
//! Epistemic foundation:
//! - K_i: OpenAI chat-completions schema is the common denominator
//! - B_i: API will respond within timeout (might fail)
//! - B_i: Response will be valid JSON with choices[0].message.content (might fail)
//! - I^B: Rate limits are unknowable in advance → roster failover, then backoff
//!
//! Every outcome is a classified [`AIResponse`]; nothing here returns an
//! error for a failed evaluation.

use crate::client::{
    Message, ModelRoster, PromptTemplate, ProviderProfile, RetryPolicy, RetryState,
};
use crate::models::{Config, CuratorError, LlmConfig, Result, RetryConfig};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Why an evaluation failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    #[error("network failure")]
    Network,

    #[error("request timed out")]
    Timeout,

    #[error("HTTP {0}")]
    Http(u16),

    #[error("malformed JSON response")]
    MalformedJson,

    #[error("response missing choices[0].message.content")]
    MissingField,

    #[error("response too short after cleaning")]
    TooShort,

    #[error("empty article body")]
    EmptyPrompt,

    #[error("max retries exceeded")]
    MaxRetriesExceeded,
}

impl ErrorKind {
    /// Worth another attempt on the same model.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network | Self::Timeout => true,
            Self::Http(status) => *status == 408 || *status >= 500,
            _ => false,
        }
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The model reviewed the article; the cleaned review text
    Curated(String),
    /// The model emitted the disqualification marker
    Rejected,
    RateLimited,
    Error(ErrorKind),
}

impl Classification {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Curated(_) => "curated",
            Self::Rejected => "rejected",
            Self::RateLimited => "rate_limited",
            Self::Error(_) => "error",
        }
    }
}

/// Response from an evaluation, with both raw and cleaned text.
#[derive(Debug, Clone)]
pub struct AIResponse {
    pub raw: String,
    /// Raw text with reasoning sections removed and trimmed
    pub cleaned: String,
    /// Model that produced the final outcome
    pub model: String,
    pub classification: Classification,
}

impl AIResponse {
    fn failed(model: &str, raw: String, kind: ErrorKind) -> Self {
        Self {
            raw,
            cleaned: String::new(),
            model: model.to_string(),
            classification: Classification::Error(kind),
        }
    }
}

/// Something that can judge an article.
#[async_trait]
pub trait Evaluator: Send {
    async fn evaluate(&mut self, article: &str) -> AIResponse;

    /// Models tried so far this run, in order.
    fn models_used(&self) -> Vec<String>;
}

/// Remove `<think>…</think>` sections. An unterminated `<think>` swallows the
/// rest of the text.
pub fn strip_reasoning(raw: &str) -> String {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        match after_open.find(CLOSE) {
            Some(end) => rest = &after_open[end + CLOSE.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// Classify a successful completion body.
pub fn classify_content(raw: &str, reject_marker: &str, min_chars: usize) -> (String, Classification) {
    let cleaned = strip_reasoning(raw);
    let classification = if !reject_marker.is_empty() && cleaned.contains(reject_marker) {
        Classification::Rejected
    } else if cleaned.chars().count() >= min_chars {
        Classification::Curated(cleaned.clone())
    } else {
        Classification::Error(ErrorKind::TooShort)
    };
    (cleaned, classification)
}

/// Chat completion request payload.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
    stream: bool,
    /// Stop key and provider-specific sampling fields
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Result of one HTTP round trip.
struct Attempt {
    raw: String,
    cleaned: String,
    classification: Classification,
}

impl Attempt {
    fn failed(kind: ErrorKind, raw: String) -> Self {
        Self {
            raw,
            cleaned: String::new(),
            classification: Classification::Error(kind),
        }
    }
}

/// LLM client that walks a model roster on rate limiting.
pub struct ModelFailoverClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    profile: ProviderProfile,
    roster: ModelRoster,
    policy: RetryPolicy,
    prompts: PromptTemplate,
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
    stop_sequences: Vec<String>,
    reject_marker: String,
    min_response_chars: usize,
}

impl ModelFailoverClient {
    pub fn new(
        llm: &LlmConfig,
        retry: &RetryConfig,
        api_key: String,
        roster: ModelRoster,
        prompts: PromptTemplate,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(llm.timeout_secs))
            .build()
            .map_err(CuratorError::Network)?;

        let profile = ProviderProfile::detect(&llm.url);
        info!(url = %llm.url, profile = ?profile, "LLM client ready");

        Ok(Self {
            http,
            url: llm.url.clone(),
            api_key,
            profile,
            roster,
            policy: RetryPolicy::from_config(retry),
            prompts,
            temperature: llm.temperature,
            top_p: llm.top_p,
            max_tokens: llm.max_tokens,
            stop_sequences: llm.stop_sequences.clone(),
            reject_marker: llm.reject_marker.clone(),
            min_response_chars: llm.min_response_chars,
        })
    }

    /// Build from the full config: resolves the key, roster and prompt files.
    pub fn from_config(config: &Config, roster: ModelRoster) -> Result<Self> {
        let api_key = config.resolve_api_key()?;
        let prompts = PromptTemplate::load(&config.llm)?;
        Self::new(&config.llm, &config.retry, api_key, roster, prompts)
    }

    pub fn roster(&self) -> &ModelRoster {
        &self.roster
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    fn request_for<'a>(&self, model: &'a str, article: &str) -> ChatCompletionRequest<'a> {
        let merge = self.profile.merges_system_prompt(&self.url, model);
        let mut extra = self.profile.extra_fields();
        extra.insert(
            self.profile.stop_key().to_string(),
            Value::from(self.stop_sequences.clone()),
        );

        ChatCompletionRequest {
            model,
            messages: self
                .prompts
                .messages(article, Utc::now().date_naive(), merge),
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            stream: false,
            extra,
        }
    }

    /// One request, classified.
    async fn send_once(&self, model: &str, article: &str) -> Attempt {
        let request = self.request_for(model, article);

        let response = match self
            .http
            .post(&self.url)
            .headers(self.headers())
            .json(&request)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return Attempt::failed(ErrorKind::Timeout, e.to_string()),
            Err(e) => return Attempt::failed(ErrorKind::Network, e.to_string()),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) if e.is_timeout() => return Attempt::failed(ErrorKind::Timeout, e.to_string()),
            Err(e) => return Attempt::failed(ErrorKind::Network, e.to_string()),
        };

        if !status.is_success() {
            let classification = if self.profile.is_rate_limited(status.as_u16(), &body) {
                Classification::RateLimited
            } else {
                Classification::Error(ErrorKind::Http(status.as_u16()))
            };
            return Attempt {
                raw: body,
                cleaned: String::new(),
                classification,
            };
        }

        let json: Value = match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(_) => return Attempt::failed(ErrorKind::MalformedJson, body),
        };

        let content = match json
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
        {
            Some(c) => c.to_string(),
            None => return Attempt::failed(ErrorKind::MissingField, body),
        };

        let (cleaned, classification) =
            classify_content(&content, &self.reject_marker, self.min_response_chars);
        if classification == Classification::Error(ErrorKind::TooShort) {
            warn!(
                model = %model,
                cleaned_len = cleaned.chars().count(),
                raw_len = content.chars().count(),
                "Suspiciously short AI response"
            );
        }

        Attempt {
            raw: content,
            cleaned,
            classification,
        }
    }
}

#[async_trait]
impl Evaluator for ModelFailoverClient {
    async fn evaluate(&mut self, article: &str) -> AIResponse {
        if article.trim().is_empty() {
            warn!("Refusing to evaluate an empty article");
            return AIResponse::failed(self.roster.current_model(), String::new(), ErrorKind::EmptyPrompt);
        }

        let mut state = RetryState::start(&self.roster);
        let mut last = Attempt::failed(ErrorKind::MaxRetriesExceeded, String::new());
        let mut last_model = self.roster.current_model().to_string();

        loop {
            let (model, attempt) = match state {
                RetryState::Trying { ref model, attempt } => (model.clone(), attempt),
                RetryState::Succeeded => {
                    info!(
                        model = %last_model,
                        outcome = last.classification.label(),
                        "Evaluation complete"
                    );
                    return AIResponse {
                        raw: last.raw,
                        cleaned: last.cleaned,
                        model: last_model,
                        classification: last.classification,
                    };
                }
                RetryState::Failed(kind) => {
                    warn!(model = %last_model, error = %kind, "Evaluation failed");
                    return AIResponse::failed(&last_model, last.raw, kind);
                }
            };

            if attempt > 0 {
                let delay = self.policy.delay(attempt - 1, &mut rand::thread_rng());
                debug!(
                    model = %model,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying after backoff"
                );
                tokio::time::sleep(delay).await;
            }

            debug!(model = %model, attempt, "Sending evaluation request");
            last = self.send_once(&model, article).await;
            if last.classification == Classification::RateLimited {
                warn!(model = %model, "Model rate limited");
            }

            state = state.next(&last.classification, &mut self.roster, &self.policy);
            last_model = model;
        }
    }

    fn models_used(&self) -> Vec<String> {
        self.roster.models_used()
    }
}
