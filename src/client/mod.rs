pub mod api;
pub mod progress;
pub mod session;
pub mod terminal;

pub use self::api::{ ChatApi, ClientStream, HttpChatApi };
pub use self::session::{ ConversationSession, Phase, SessionError, SessionState, Tab, ADVISORY };

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server url: {0}")]
    Url(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server returned HTTP {status}: {message}")]
    Server { status: u16, message: String },

    #[error("response stream failed: {0}")]
    Stream(String),
}
