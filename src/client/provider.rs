//! Provider-specific request shaping.
//!
//! K_i: Every supported provider accepts the OpenAI chat schema, but they
//! disagree on the stop-sequence key and on extra sampling controls. The
//! endpoint URL prefix decides which dialect to speak.

use serde_json::{json, Map, Value};

const GOOGLE_PREFIX: &str = "https://generativelanguage.googleapis.com";
const GOOGLE_OPENAI_PREFIX: &str =
    "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions";
const ARLIAI_PREFIX: &str = "https://api.arliai.com";

/// Body marker some providers attach to a 503 when capacity is exhausted.
pub const OVERLOADED_MARKER: &str = "The model is overloaded. Please try again later.";

/// Request dialect of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderProfile {
    /// Google's OpenAI-compatibility layer
    Google,
    /// vLLM-backed ArliAI API
    ArliAi,
    /// Any other OpenAI-compatible endpoint
    Generic,
}

impl ProviderProfile {
    pub fn detect(url: &str) -> Self {
        if url.starts_with(GOOGLE_PREFIX) {
            Self::Google
        } else if url.starts_with(ARLIAI_PREFIX) {
            Self::ArliAi
        } else {
            Self::Generic
        }
    }

    /// Name of the stop-sequence field.
    pub fn stop_key(self) -> &'static str {
        match self {
            Self::Google => "stop",
            Self::ArliAi | Self::Generic => "stop_sequences",
        }
    }

    /// Sampling controls beyond the common set.
    pub fn extra_fields(self) -> Map<String, Value> {
        let mut extra = Map::new();
        if self == Self::ArliAi {
            extra.insert("repetition_penalty".to_string(), json!(1.1));
            extra.insert("top_k".to_string(), json!(40));
            extra.insert("frequency_penalty".to_string(), json!(0.3));
            extra.insert("presence_penalty".to_string(), json!(0.3));
            extra.insert("min_p".to_string(), json!(0.0));
            extra.insert(
                "chat_template_kwargs".to_string(),
                json!({ "enable_thinking": false }),
            );
        }
        extra
    }

    /// Gemma on Google's compatibility endpoint rejects system messages, so
    /// both prompts travel in one user message.
    pub fn merges_system_prompt(self, url: &str, model: &str) -> bool {
        self == Self::Google
            && url.starts_with(GOOGLE_OPENAI_PREFIX)
            && model.to_lowercase().contains("gemma")
    }

    /// Whether an error status and body mean "try another model".
    pub fn is_rate_limited(self, status: u16, body: &str) -> bool {
        status == 429 || (status == 503 && body.contains(OVERLOADED_MARKER))
    }
}
