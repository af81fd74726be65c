use async_trait::async_trait;
use futures::{ future, Stream, StreamExt };
use log::debug;
use std::pin::Pin;
use url::Url;

use super::ClientError;
use crate::models::chat::{ ChatRequest, ErrorBody };

pub type ClientStream = Pin<Box<dyn Stream<Item = Result<String, ClientError>> + Send>>;

/// Transport used by the conversation session to reach `POST /api/chat`.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn send(&self, request: ChatRequest) -> Result<ClientStream, ClientError>;
}

pub struct HttpChatApi {
    http: reqwest::Client,
    endpoint: Url,
}

impl HttpChatApi {
    pub fn new(server_url: &str) -> Result<Self, ClientError> {
        let mut base = Url::parse(server_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            endpoint: base.join("api/chat")?,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn send(&self, request: ChatRequest) -> Result<ClientStream, ClientError> {
        debug!("POST {} ({} message(s))", self.endpoint, request.messages.len());
        let resp = self.http.post(self.endpoint.clone()).json(&request).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = match resp.json::<ErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
            };
            return Err(ClientError::Server { status: status.as_u16(), message });
        }

        Ok(decode_utf8(resp.bytes_stream()))
    }
}

/// Turns a byte stream into text chunks, holding back a multi-byte sequence
/// that was split across two chunks until it is complete.
pub(crate) fn decode_utf8<S, B, E>(bytes: S) -> ClientStream
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + 'static,
        E: 'static,
        ClientError: From<E>
{
    let stream = bytes
        .scan(Vec::<u8>::new(), |pending, chunk| {
            let item = match chunk {
                Ok(buf) => {
                    pending.extend_from_slice(buf.as_ref());
                    Ok(take_valid_utf8(pending))
                }
                Err(e) => Err(ClientError::from(e)),
            };
            future::ready(Some(item))
        })
        .filter(|item| future::ready(!matches!(item, Ok(text) if text.is_empty())));
    Box::pin(stream)
}

fn take_valid_utf8(pending: &mut Vec<u8>) -> String {
    match std::str::from_utf8(pending) {
        Ok(text) => {
            let text = text.to_string();
            pending.clear();
            text
        }
        // Incomplete trailing sequence: keep it for the next chunk.
        Err(e) if e.error_len().is_none() => {
            let valid = e.valid_up_to();
            let text = String::from_utf8_lossy(&pending[..valid]).into_owned();
            pending.drain(..valid);
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn endpoint_is_joined_onto_base() {
        let api = HttpChatApi::new("http://localhost:3000").unwrap();
        assert_eq!(api.endpoint().as_str(), "http://localhost:3000/api/chat");
        let api = HttpChatApi::new("https://example.com/pro").unwrap();
        assert_eq!(api.endpoint().as_str(), "https://example.com/pro/api/chat");
        assert!(matches!(HttpChatApi::new("not a url"), Err(ClientError::Url(_))));
    }

    #[tokio::test]
    async fn split_multibyte_characters_are_reassembled() {
        let euro = "€".as_bytes();
        let chunks: Vec<Result<Vec<u8>, ClientError>> = vec![
            Ok(b"cost: ".to_vec()),
            Ok(euro[..1].to_vec()),
            Ok(euro[1..].to_vec()),
            Ok(b"5".to_vec()),
        ];
        let out: Vec<String> = decode_utf8(stream::iter(chunks))
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(out, vec!["cost: ", "€", "5"]);
    }

    #[tokio::test]
    async fn errors_pass_through() {
        let chunks: Vec<Result<Vec<u8>, ClientError>> = vec![
            Ok(b"partial".to_vec()),
            Err(ClientError::Stream("reset".into())),
        ];
        let out: Vec<_> = decode_utf8(stream::iter(chunks)).collect().await;
        assert_eq!(out.len(), 2);
        assert!(matches!(&out[1], Err(ClientError::Stream(m)) if m == "reset"));
    }
}
