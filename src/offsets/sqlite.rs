//! SQLite-backed offset store and its schema migrations.

use crate::dedup::OffsetSnapshot;
use crate::error::DatabaseError;
use crate::types::{ItemType, Offset, PartitionKey};
use crate::{Error, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use sqlx::{FromRow, SqliteConnection};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use super::OffsetStore;

/// Offset record from the database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct OffsetRow {
    /// Item-type namespace ("posts" or "comments")
    pub item_type: String,
    /// Channel name
    pub channel: String,
    /// Creation timestamp of the last delivered item, in epoch milliseconds
    pub created: i64,
    /// Unix timestamp of the last commit
    pub updated_at: i64,
}

impl OffsetRow {
    /// Map the row back to its partition key and offset
    pub fn into_entry(self) -> Result<(PartitionKey, Offset)> {
        let item_type = ItemType::from_str(&self.item_type)
            .map_err(|e| Error::Database(DatabaseError::CorruptRow(e)))?;
        Ok((
            PartitionKey::new(item_type, self.channel),
            Offset::new(self.created),
        ))
    }
}

/// Offset store persisted in a SQLite file
pub struct SqliteOffsetStore {
    pool: SqlitePool,
}

impl SqliteOffsetStore {
    /// Open (or create) the offset database at `path`
    ///
    /// Creates the parent directory and the file if they don't exist, then
    /// runs migrations.
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to create database directory: {}",
                    e
                )))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to parse database path: {}",
                    e
                )))
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to connect to database: {}",
                e
            )))
        })?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Every stored offset, ordered by item-type then channel
    pub async fn all_offsets(&self) -> Result<Vec<(PartitionKey, Offset)>> {
        let rows = sqlx::query_as::<_, OffsetRow>(
            r#"
            SELECT item_type, channel, created, updated_at
            FROM source_offsets
            ORDER BY item_type ASC, channel ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list offsets: {}",
                e
            )))
        })?;

        rows.into_iter().map(OffsetRow::into_entry).collect()
    }

    /// Close the connection pool
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create schema_version table: {}",
                e
            )))
        })?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to query schema version: {}",
                        e
                    )))
                })?
                .flatten();

        if current_version.unwrap_or(0) < 1 {
            Self::migrate_v1(&mut conn).await?;
        }

        Ok(())
    }

    /// Migration v1: offsets table
    async fn migrate_v1(conn: &mut SqliteConnection) -> Result<()> {
        tracing::info!("Applying offset store migration v1");

        sqlx::query("BEGIN").execute(&mut *conn).await.map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        let result = async {
            sqlx::query(
                r#"
                CREATE TABLE source_offsets (
                    item_type TEXT NOT NULL,
                    channel TEXT NOT NULL,
                    created INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    PRIMARY KEY (item_type, channel)
                )
                "#,
            )
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to create source_offsets table: {}",
                    e
                )))
            })?;

            sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (1, ?)")
                .bind(chrono::Utc::now().timestamp())
                .execute(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::MigrationFailed(format!(
                        "Failed to record migration v1: {}",
                        e
                    )))
                })?;

            Ok::<(), Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT").execute(&mut *conn).await.map_err(|e| {
                    Error::Database(DatabaseError::MigrationFailed(format!(
                        "Failed to commit migration v1: {}",
                        e
                    )))
                })?;
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        }

        tracing::info!("Offset store migration v1 complete");
        Ok(())
    }
}

#[async_trait]
impl OffsetStore for SqliteOffsetStore {
    async fn snapshot(&self, keys: &HashSet<PartitionKey>) -> Result<OffsetSnapshot> {
        let mut offsets = Vec::with_capacity(keys.len());

        for key in keys {
            let created: Option<Offset> = sqlx::query_scalar(
                r#"
                SELECT created FROM source_offsets
                WHERE item_type = ? AND channel = ?
                "#,
            )
            .bind(key.item_type.as_str())
            .bind(key.channel.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to load offset for {}: {}",
                    key, e
                )))
            })?;

            if let Some(created) = created {
                offsets.push((key.clone(), created));
            }
        }

        tracing::debug!(
            requested = keys.len(),
            found = offsets.len(),
            "Loaded offset snapshot"
        );

        Ok(offsets.into_iter().collect())
    }

    async fn commit(&self, key: &PartitionKey, offset: Offset) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO source_offsets (item_type, channel, created, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(item_type, channel) DO UPDATE
            SET created = MAX(created, excluded.created),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key.item_type.as_str())
        .bind(key.channel.as_str())
        .bind(offset)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit offset for {}: {}",
                key, e
            )))
        })?;

        Ok(())
    }
}
