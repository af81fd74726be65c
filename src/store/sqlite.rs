use async_trait::async_trait;
use chrono::NaiveDateTime;
use log::{ debug, info };
use r2d2::{ CustomizeConnection, Pool };
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use super::{ LogEntry, MessageLog, NewLogEntry, StoreError };

pub type DbPool = Pool<SqliteConnectionManager>;

const SQLITE_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL,
    translation TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);";

#[derive(Debug)]
struct SqlitePragmaCustomizer;

impl CustomizeConnection<rusqlite::Connection, rusqlite::Error> for SqlitePragmaCustomizer {
    fn on_acquire(&self, conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch("PRAGMA busy_timeout = 5000;\nPRAGMA synchronous = NORMAL;")
    }
}

/// SQLite-backed log. The pool is built once at startup and shared by every
/// request handler.
#[derive(Clone)]
pub struct SqliteMessageLog {
    pool: DbPool,
}

impl SqliteMessageLog {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        info!("Opening message log database at {}", path);
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(4)
            .connection_customizer(Box::new(SqlitePragmaCustomizer))
            .build(manager)?;
        Self::from_pool(pool)
    }

    pub fn from_pool(pool: DbPool) -> Result<Self, StoreError> {
        {
            let conn = pool.get()?;
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            conn.execute_batch(SCHEMA)?;
            debug!("messages table ready");
        }
        Ok(Self { pool })
    }

    pub async fn all(&self) -> Result<Vec<LogEntry>, StoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<LogEntry>, StoreError> {
            let conn = pool.get()?;
            let mut stmt = conn.prepare(
                "SELECT id, content, translation, created_at FROM messages ORDER BY id"
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?;

            let mut entries = Vec::new();
            for row in rows {
                let (id, content, translation, created_at) = row?;
                entries.push(LogEntry {
                    id,
                    content,
                    translation,
                    created_at: parse_timestamp(&created_at)?,
                });
            }
            Ok(entries)
        }).await?
    }
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, StoreError> {
    NaiveDateTime::parse_from_str(raw, SQLITE_TIMESTAMP)
        .map_err(|_| StoreError::Timestamp(raw.to_string()))
}

#[async_trait]
impl MessageLog for SqliteMessageLog {
    async fn insert(&self, entry: NewLogEntry) -> Result<LogEntry, StoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<LogEntry, StoreError> {
            let conn = pool.get()?;
            let (id, created_at): (i64, String) = conn.query_row(
                "INSERT INTO messages (content, translation) VALUES (?1, ?2)
                 RETURNING id, created_at",
                params![entry.content, entry.translation],
                |row| Ok((row.get(0)?, row.get(1)?))
            )?;
            Ok(LogEntry {
                id,
                content: entry.content,
                translation: entry.translation,
                created_at: parse_timestamp(&created_at)?,
            })
        }).await?
    }
}
