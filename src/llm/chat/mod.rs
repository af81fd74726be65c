pub mod gemini;

use async_trait::async_trait;
use futures::{ Stream, StreamExt };
use std::pin::Pin;
use std::sync::Arc;
use super::{ LlmConfig, LlmError };
use self::gemini::GeminiChatClient;
use crate::models::chat::ChatMessage;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use log::{ debug, warn };

pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

pub type LineParser = fn(&str) -> Result<Option<String>, LlmError>;

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Starts a streaming completion. Returns once the provider has accepted
    /// the request, so construction and transport failures surface here
    /// rather than inside the stream.
    async fn stream_chat(
        &self,
        system: &str,
        messages: &[ChatMessage]
    ) -> Result<TokenStream, LlmError>;

    fn get_model(&self) -> String;

    fn get_provider(&self) -> &'static str;

    fn model_parameters(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, LlmError> {
    let client = GeminiChatClient::from_config(config)?;
    Ok(Arc::new(client))
}

/// Posts `payload` and forwards the line-oriented response body as tokens.
///
/// The request is sent and its status checked before this returns; the body
/// is then read by a background task and pushed through a bounded channel.
/// Dropping the returned stream stops the reader, which drops the upstream
/// connection.
pub async fn http_stream_generate(
    client: &reqwest::Client,
    url: &str,
    payload: impl serde::Serialize + Send,
    line_parser: LineParser,
    headers: Option<Vec<(String, String)>>,
) -> Result<TokenStream, LlmError> {
    let mut req = client.post(url).json(&payload);

    if let Some(header_list) = headers {
        for (name, value) in header_list {
            req = req.header(name, value);
        }
    }

    let resp = req.send().await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(LlmError::Status { status: status.as_u16(), body });
    }

    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let mut bytes = resp.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();

        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(buf) => {
                    pending.extend_from_slice(&buf);
                    while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = pending.drain(..=pos).collect();
                        if !forward_line(&tx, &line, line_parser).await {
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!("Upstream stream read failed: {}", e);
                    let _ = tx.send(Err(LlmError::Request(e))).await;
                    return;
                }
            }
        }

        if !pending.is_empty() {
            forward_line(&tx, &pending, line_parser).await;
        }
        debug!("Upstream stream finished");
    });

    Ok(Box::pin(ReceiverStream::new(rx)))
}

/// Returns false when the stream should stop: either the receiver is gone or
/// the parser reported an error.
async fn forward_line(
    tx: &mpsc::Sender<Result<String, LlmError>>,
    raw: &[u8],
    line_parser: LineParser
) -> bool {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim_end_matches(['\n', '\r']);
    match line_parser(line) {
        Ok(Some(tok)) => tx.send(Ok(tok)).await.is_ok(),
        Ok(None) => !tx.is_closed(),
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}
