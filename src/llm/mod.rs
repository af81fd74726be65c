pub mod chat;

use thiserror::Error;

pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash-preview-04-17";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_THINKING_BUDGET: u32 = 20_000;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub completion_model: Option<String>,
    pub base_url: Option<String>,
    /// Upper bound on the provider's internal reasoning tokens.
    pub thinking_budget: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            completion_model: None,
            base_url: None,
            thinking_budget: DEFAULT_THINKING_BUDGET,
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API key is required for the chat client")]
    MissingApiKey,

    #[error("request to model provider failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("model provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model stream failed: {0}")]
    Stream(String),

    #[error("failed to decode model response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl LlmError {
    /// Short description that is safe to hand back to API callers.
    pub fn public_message(&self) -> &'static str {
        match self {
            LlmError::MissingApiKey => "The language model is not configured.",
            LlmError::Request(_) => "The language model could not be reached.",
            LlmError::Status { .. } => "The language model rejected the request.",
            LlmError::Stream(_) | LlmError::Decode(_) => "The language model returned an invalid response.",
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            LlmError::Status { status, .. } => Some(*status),
            LlmError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
