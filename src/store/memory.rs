use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;

use super::{ LogEntry, MessageLog, NewLogEntry, StoreError };

/// Process-local log, used for development and tests.
#[derive(Default)]
pub struct MemoryMessageLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryMessageLog {
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MessageLog for MemoryMessageLog {
    async fn insert(&self, entry: NewLogEntry) -> Result<LogEntry, StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let id = entries.last().map(|e| e.id + 1).unwrap_or(1);
        let stored = LogEntry {
            id,
            content: entry.content,
            translation: entry.translation,
            created_at: Utc::now().naive_utc(),
        };
        entries.push(stored.clone());
        Ok(stored)
    }
}
