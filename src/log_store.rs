//! Append-only store for accepted submissions (`request_logs` table).

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use tracing::debug;

/// Stored `query` and `user_agent` are cut to this many characters.
pub const MAX_FIELD_CHARS: usize = 200;

/// Column list for `request_logs` queries.
const COLUMNS: &str = "id, ip, user_agent, query, created_at";

/// One accepted submission.
#[derive(Debug, Clone, FromRow)]
pub struct LogEntry {
    pub id: i64,
    pub ip: String,
    pub user_agent: Option<String>,
    pub query: String,
    pub created_at: DateTime<Utc>,
}

/// What happens to a request when its log row cannot be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFailurePolicy {
    /// End the request on the error page.
    #[default]
    Abort,
    /// Warn and keep going.
    Continue,
}

#[derive(Debug, Clone)]
pub struct LogStore {
    pool: SqlitePool,
}

impl LogStore {
    /// Open (creating if needed) the database at `url`.
    ///
    /// In-memory databases are pinned to a single connection that never
    /// expires, otherwise every new connection would see an empty database.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(max_connections)
                .connect_with(options)
                .await?
        };
        Ok(Self { pool })
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Append one entry, truncating `query` and `user_agent`.
    pub async fn record(
        &self,
        ip: &str,
        user_agent: Option<&str>,
        query: &str,
    ) -> Result<LogEntry, sqlx::Error> {
        let query_text = truncate_chars(query, MAX_FIELD_CHARS);
        let user_agent = user_agent.map(|ua| truncate_chars(ua, MAX_FIELD_CHARS));
        let sql = format!(
            "INSERT INTO request_logs (ip, user_agent, query, created_at) \
             VALUES (?, ?, ?, ?) \
             RETURNING {COLUMNS}"
        );
        let entry = sqlx::query_as::<_, LogEntry>(&sql)
            .bind(ip)
            .bind(user_agent)
            .bind(query_text)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;
        debug!(id = entry.id, ip = %entry.ip, "Request logged");
        Ok(entry)
    }

    /// Newest entries first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<LogEntry>, sqlx::Error> {
        let sql = format!(
            "SELECT {COLUMNS} FROM request_logs \
             ORDER BY id DESC \
             LIMIT ?"
        );
        sqlx::query_as::<_, LogEntry>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
    }

    /// True if the database answers a trivial query.
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Longest prefix of `s` holding at most `max` characters.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
