use async_trait::async_trait;
use serde::{ Deserialize, Serialize };
use log::info;

use super::{ ChatClient, TokenStream, http_stream_generate };
use crate::llm::{ LlmConfig, LlmError, DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL };
use crate::models::chat::{ ChatMessage, Role };

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiStreamRequest {
    system_instruction: GeminiContent,
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    thinking_config: ThinkingConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Deserialize)]
struct GoogleChunk {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
    error: Option<GoogleError>,
}

#[derive(Deserialize)]
struct GoogleCandidate {
    content: Option<GoogleContent>,
}

#[derive(Deserialize)]
struct GoogleContent {
    #[serde(default)]
    parts: Vec<GooglePart>,
}

#[derive(Deserialize)]
struct GooglePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize)]
struct GoogleError {
    message: String,
}

fn gemini_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

/// Parses one line of the `alt=sse` response. Anything other than a `data:`
/// line is ignored; thought summaries are dropped.
pub(crate) fn parse_gemini_line(line: &str) -> Result<Option<String>, LlmError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(None);
    }

    let chunk: GoogleChunk = serde_json::from_str(data)?;
    if let Some(err) = chunk.error {
        return Err(LlmError::Stream(err.message));
    }

    let text: String = chunk.candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content.parts
                .iter()
                .filter(|p| !p.thought)
                .filter_map(|p| p.text.as_deref())
                .collect()
        })
        .unwrap_or_default();

    Ok(if text.is_empty() { None } else { Some(text) })
}

pub struct GeminiChatClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    thinking_budget: u32,
}

impl GeminiChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        thinking_budget: u32
    ) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let model = model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string());
        let base_url = base_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            http: reqwest::Client::builder().build()?,
            api_key,
            model,
            base_url,
            thinking_budget,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config.api_key.clone().ok_or(LlmError::MissingApiKey)?;
        Self::new(
            api_key,
            config.completion_model.clone(),
            config.base_url.clone(),
            config.thinking_budget
        )
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    fn build_request(&self, system: &str, messages: &[ChatMessage]) -> GeminiStreamRequest {
        GeminiStreamRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart { text: system.to_string() }],
            },
            contents: messages
                .iter()
                .map(|m| GeminiContent {
                    role: Some(gemini_role(m.role)),
                    parts: vec![GeminiPart { text: m.content.clone() }],
                })
                .collect(),
            generation_config: GenerationConfig {
                thinking_config: ThinkingConfig { thinking_budget: self.thinking_budget },
            },
        }
    }
}

#[async_trait]
impl ChatClient for GeminiChatClient {
    async fn stream_chat(
        &self,
        system: &str,
        messages: &[ChatMessage]
    ) -> Result<TokenStream, LlmError> {
        info!(
            "GeminiChatClient::stream_chat() → model={} messages={} thinking_budget={}",
            self.model,
            messages.len(),
            self.thinking_budget
        );

        let payload = self.build_request(system, messages);
        let headers = vec![
            ("x-goog-api-key".to_string(), self.api_key.clone())
        ];

        http_stream_generate(
            &self.http,
            &self.stream_url(),
            payload,
            parse_gemini_line,
            Some(headers),
        ).await
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_provider(&self) -> &'static str {
        "gemini"
    }

    fn model_parameters(&self) -> serde_json::Value {
        serde_json::json!({ "thinking_budget": self.thinking_budget })
    }
}
