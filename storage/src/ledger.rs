use analyzer_core::{CoreError, DatabaseError, LedgerEntry};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

/// Durable record of posts that have already been handled.
pub trait Ledger {
    async fn contains(&self, post_id: &str) -> Result<bool, CoreError>;

    /// Inserts `entry`. An existing entry for the same post is left as is.
    async fn mark_processed(&self, entry: &LedgerEntry) -> Result<(), CoreError>;
}

pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    /// Opens (creating if needed) the ledger database at `database_url` and
    /// runs migrations.
    pub async fn connect(database_url: &str) -> Result<Self, CoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?
            .create_if_missing(true);

        // Each connection to an in-memory database is a separate database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        let ledger = Self { pool };
        ledger.run_migrations().await?;
        info!("Ledger database ready at {}", database_url);
        Ok(ledger)
    }

    #[cfg(test)]
    pub(crate) async fn in_memory() -> Result<Self, CoreError> {
        Self::connect("sqlite::memory:").await
    }

    async fn run_migrations(&self) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS processed_posts (
                post_id TEXT PRIMARY KEY,
                processed_timestamp_utc TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|_| DatabaseError::MigrationFailed {
            migration: "create processed_posts".to_string(),
        })?;

        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    #[cfg(test)]
    pub(crate) async fn get_entry(&self, post_id: &str) -> Result<Option<LedgerEntry>, CoreError> {
        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT post_id, processed_timestamp_utc FROM processed_posts WHERE post_id = ?",
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        row.map(|(post_id, timestamp)| -> Result<LedgerEntry, CoreError> {
            let processed = chrono::DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|_| DatabaseError::QueryFailed {
                    query: format!("unreadable timestamp for {post_id}"),
                })?
                .with_timezone(&chrono::Utc);
            Ok(LedgerEntry::new(post_id, processed))
        })
        .transpose()
    }

    #[cfg(test)]
    pub(crate) async fn count(&self) -> Result<i64, CoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM processed_posts")
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        Ok(count)
    }
}

impl Ledger for SqliteLedger {
    async fn contains(&self, post_id: &str) -> Result<bool, CoreError> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM processed_posts WHERE post_id = ?")
                .bind(post_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(DatabaseError::from)?;
        Ok(found.is_some())
    }

    async fn mark_processed(&self, entry: &LedgerEntry) -> Result<(), CoreError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO processed_posts (post_id, processed_timestamp_utc) VALUES (?, ?)",
        )
        .bind(&entry.post_id)
        .bind(entry.processed_timestamp_utc.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        if result.rows_affected() == 0 {
            debug!("Post {} was already in the ledger", entry.post_id);
        }
        Ok(())
    }
}
