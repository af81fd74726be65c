use async_trait::async_trait;
use chrono::Utc;
use redis::{ AsyncCommands, Client };

use super::{ LogEntry, MessageLog, NewLogEntry, StoreError };

/// Redis-backed log: an `INCR` counter supplies ids and entries are appended
/// as JSON to a list.
pub struct RedisMessageLog {
    client: Client,
    key_prefix: String,
}

impl RedisMessageLog {
    pub fn new(host: &str, key_prefix: &str) -> Result<Self, StoreError> {
        Ok(Self {
            client: Client::open(host)?,
            key_prefix: key_prefix.to_string(),
        })
    }

    fn id_key(&self) -> String {
        format!("{}messages:id", self.key_prefix)
    }

    fn list_key(&self) -> String {
        format!("{}messages", self.key_prefix)
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }
}

#[async_trait]
impl MessageLog for RedisMessageLog {
    async fn insert(&self, entry: NewLogEntry) -> Result<LogEntry, StoreError> {
        let mut conn = self.get_connection().await?;
        let id: i64 = conn.incr(self.id_key(), 1).await?;

        let stored = LogEntry {
            id,
            content: entry.content,
            translation: entry.translation,
            created_at: Utc::now().naive_utc(),
        };

        let json_entry = serde_json::to_string(&stored)?;
        let _: i64 = conn.rpush(self.list_key(), &json_entry).await?;
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_use_prefix() {
        let log = RedisMessageLog::new("redis://127.0.0.1:6379", "pro:").unwrap();
        assert_eq!(log.id_key(), "pro:messages:id");
        assert_eq!(log.list_key(), "pro:messages");
    }

    #[test]
    fn rejects_invalid_url() {
        assert!(matches!(RedisMessageLog::new("not a url", "p:"), Err(StoreError::Redis(_))));
    }
}
