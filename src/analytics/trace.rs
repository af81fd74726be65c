use log::debug;
use serde_json::json;
use std::time::Instant;
use uuid::Uuid;

use super::{ AnalyticsEvent, AnalyticsScope };
use crate::llm::LlmError;
use crate::llm::chat::{ ChatClient, TokenStream };
use crate::models::chat::ChatMessage;

pub const GENERATION_EVENT: &str = "$ai_generation";

/// Observes one model invocation and records it as a `$ai_generation` event.
pub struct GenerationTrace {
    trace_id: Uuid,
    started: Instant,
    provider: &'static str,
    model: String,
    parameters: serde_json::Value,
    input: serde_json::Value,
}

impl GenerationTrace {
    pub fn start(client: &dyn ChatClient, system: &str, messages: &[ChatMessage]) -> Self {
        let mut input = vec![json!({ "role": "system", "content": system })];
        input.extend(messages.iter().map(|m| json!({ "role": m.role, "content": m.content })));

        Self {
            trace_id: Uuid::new_v4(),
            started: Instant::now(),
            provider: client.get_provider(),
            model: client.get_model(),
            parameters: client.model_parameters(),
            input: serde_json::Value::Array(input),
        }
    }

    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    pub fn finish(self, scope: &mut AnalyticsScope, outcome: Result<(), &LlmError>) {
        let latency = self.started.elapsed().as_secs_f64();
        let trace_id = self.trace_id.to_string();
        let mut event = AnalyticsEvent::new(GENERATION_EVENT, trace_id.clone())
            .with("$ai_trace_id", &trace_id)
            .with("$ai_provider", self.provider)
            .with("$ai_model", &self.model)
            .with("$ai_model_parameters", &self.parameters)
            .with("$ai_input", &self.input)
            .with("$ai_latency", latency)
            .with("$ai_is_error", outcome.is_err())
            .with("$process_person_profile", false);

        event = match outcome {
            Ok(()) => event.with("$ai_http_status", 200),
            Err(e) => event
                .with("$ai_http_status", e.http_status().unwrap_or(500))
                .with("$ai_error", e.to_string()),
        };

        debug!("Recorded generation trace {} ({:.3}s)", trace_id, latency);
        scope.capture(event);
    }
}

/// Runs `ChatClient::stream_chat` inside a generation trace recorded on
/// `scope`.
pub async fn traced_stream_chat(
    client: &dyn ChatClient,
    scope: &mut AnalyticsScope,
    system: &str,
    messages: &[ChatMessage]
) -> Result<TokenStream, LlmError> {
    let trace = GenerationTrace::start(client, system, messages);
    let result = client.stream_chat(system, messages).await;
    trace.finish(scope, result.as_ref().map(|_| ()));
    result
}
