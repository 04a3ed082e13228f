use crate::error::StoreError;
use crate::models::{parse_sqlite_utc, Message};
use rusqlite::types::{Type, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

mod activity;
mod identity;
mod index;
mod messages;
pub mod schema;

pub use activity::RankRow;
pub use index::fts_phrase;

const MESSAGE_COLUMNS: &str = "message_id, author_id, channel_id, timestamp, content, attachment_url";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle on one guild's archive.
///
/// Cloning is cheap and shares the connection. All statements run under the
/// connection mutex, so a single statement or transaction is atomic with
/// respect to every other caller of the same guild.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

/// Result of a read-only diagnostic statement.
#[derive(Debug, Default)]
pub struct DiagnosticRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub truncated: bool,
}

impl Database {
    /// Opens (creating if needed) `<dir>/<guild_id>.db` and ensures the schema.
    pub fn open(dir: &Path, guild_id: u64) -> Result<Self, StoreError> {
        let path = dir.join(format!("{}.db", guild_id));
        let unavailable = |reason: String| StoreError::Unavailable {
            path: path.clone(),
            reason,
        };

        std::fs::create_dir_all(dir).map_err(|e| unavailable(e.to_string()))?;
        let conn = Connection::open(&path).map_err(|e| unavailable(e.to_string()))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| unavailable(e.to_string()))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(|e| unavailable(e.to_string()))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.clone()),
        };
        db.execute_init().map_err(|e| unavailable(e.to_string()))?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let db = Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
            path: None,
        };
        db.execute_init()?;
        Ok(db)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn execute_init(&self) -> Result<(), StoreError> {
        info!("Database: Initializing schema...");
        let conn = self.conn()?;
        conn.execute_batch(schema::SCHEMA)?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Runs `f` on the blocking pool so SQLite never stalls the async runtime.
    pub async fn run_blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    /// Highest stored message, the resume point for catch-up.
    pub fn watermark(&self) -> Result<Option<Message>, StoreError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM message ORDER BY message_id DESC LIMIT 1",
            MESSAGE_COLUMNS
        );
        Ok(conn.query_row(&sql, [], message_from_row).optional()?)
    }

    /// Runs an arbitrary read-only statement for owner diagnostics.
    pub fn diagnostic_query(&self, sql: &str, max_rows: usize) -> Result<DiagnosticRows, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        if !stmt.readonly() {
            return Err(StoreError::NotReadOnly);
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();
        let mut result = DiagnosticRows {
            columns,
            ..Default::default()
        };

        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            if result.rows.len() >= max_rows {
                result.truncated = true;
                break;
            }
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(match row.get_ref(i)? {
                    ValueRef::Null => "NULL".to_string(),
                    ValueRef::Integer(v) => v.to_string(),
                    ValueRef::Real(v) => v.to_string(),
                    ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
                    ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
                });
            }
            result.rows.push(values);
        }
        Ok(result)
    }
}

fn message_from_row(row: &Row) -> rusqlite::Result<Message> {
    let raw_ts: String = row.get(3)?;
    let timestamp = parse_sqlite_utc(&raw_ts).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("invalid timestamp '{}'", raw_ts).into(),
        )
    })?;
    Ok(Message {
        message_id: row.get(0)?,
        author_id: row.get(1)?,
        channel_id: row.get(2)?,
        timestamp,
        content: row.get(4)?,
        attachment_url: row.get(5)?,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::models::Message;
    use chrono::{TimeZone, Utc};

    /// Message `id` in `channel` written by pseudonymous `author`, posted
    /// `id` minutes after 2023-01-01.
    pub fn message(id: i64, channel: i64, author: &str, content: &str) -> Message {
        Message {
            message_id: id,
            author_id: author.to_string(),
            channel_id: channel,
            timestamp: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
                + chrono::Duration::minutes(id),
            content: content.to_string(),
            attachment_url: None,
        }
    }
}
