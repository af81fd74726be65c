mod memory;
mod redis;
mod sqlite;

pub use self::memory::MemoryMessageLog;
pub use self::redis::RedisMessageLog;
pub use self::sqlite::SqliteMessageLog;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use log::info;
use serde::{ Deserialize, Serialize };
use std::sync::Arc;
use thiserror::Error;
use crate::cli::StoreArgs;

/// One row of the append-only message log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub content: String,
    pub translation: String,
    pub created_at: NaiveDateTime,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewLogEntry {
    pub content: String,
    pub translation: String,
}

impl NewLogEntry {
    /// The translation column is reserved; submissions are always logged
    /// with it empty.
    pub fn submitted(content: impl Into<String>) -> Self {
        Self { content: content.into(), translation: String::new() }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid timestamp '{0}'")]
    Timestamp(String),

    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("unsupported log store type: {0}")]
    UnsupportedType(String),
}

/// Append-only log of submitted messages.
#[async_trait]
pub trait MessageLog: Send + Sync {
    async fn insert(&self, entry: NewLogEntry) -> Result<LogEntry, StoreError>;
}

pub fn create_message_log(args: &StoreArgs) -> Result<Arc<dyn MessageLog>, StoreError> {
    match args.log_store_type.to_lowercase().as_str() {
        "sqlite" => {
            let store = SqliteMessageLog::open(&args.log_store_path)?;
            Ok(Arc::new(store))
        }
        "redis" => {
            let store = RedisMessageLog::new(&args.log_store_host, &args.log_redis_prefix)?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(MemoryMessageLog::default())),
        other => Err(StoreError::UnsupportedType(other.to_string())),
    }
}

pub fn initialize_message_log(args: &StoreArgs) -> Result<Arc<dyn MessageLog>, StoreError> {
    match args.log_store_type.to_lowercase().as_str() {
        "sqlite" => info!("Submitted messages will be logged to sqlite at {}", args.log_store_path),
        "redis" => info!("Submitted messages will be logged to redis at {}", args.log_store_host),
        other => info!("Submitted messages will be logged to: {}", other),
    }
    create_message_log(args)
}
