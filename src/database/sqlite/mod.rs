use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::CollectionStore;
use super::models::{CollectionSummary, StoredCollection, VectorRecord};
use crate::{MemoryError, Result};


pub type DbPool = Pool<Sqlite>;

/// SQLite-backed collection store, one row per conversation
#[derive(Debug, Clone)]
pub struct SqliteCollectionStore {
    pool: DbPool,
    database_path: PathBuf,
}

fn encode_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| MemoryError::Storage(format!("Invalid timestamp {:?}: {}", value, e)))
}

fn storage_error(action: &str) -> impl FnOnce(sqlx::Error) -> MemoryError + '_ {
    move |e| MemoryError::Storage(format!("{}: {}", action, e))
}

impl SqliteCollectionStore {
    /// Create a store without touching the disk; [`CollectionStore::open`]
    /// creates the file and schema.
    #[inline]
    pub fn new<P: AsRef<Path>>(database_path: P) -> Self {
        let options = SqliteConnectOptions::new()
            .filename(database_path.as_ref())
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_lazy_with(options);

        Self {
            pool,
            database_path: database_path.as_ref().to_path_buf(),
        }
    }

    /// Create and open a store in one step
    #[inline]
    pub async fn connect<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let store = Self::new(database_path);
        store.open().await?;
        Ok(store)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to run schema migration: {}", e)))?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    /// All persisted collections, most recently updated first
    #[inline]
    pub async fn list_collections(&self) -> Result<Vec<CollectionSummary>> {
        let rows = sqlx::query_as::<_, (String, i64, String, String)>(
            r#"
            SELECT chat_id, vector_count, last_update, version
            FROM vector_collections
            ORDER BY last_update DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error("Failed to list collections"))?;

        rows.into_iter()
            .map(|(chat_id, vector_count, last_update, version)| {
                Ok(CollectionSummary {
                    last_update: decode_timestamp(&last_update)?,
                    chat_id,
                    vector_count,
                    version,
                })
            })
            .collect()
    }

    /// Remove a persisted collection. Returns whether one existed.
    #[inline]
    pub async fn delete(&self, chat_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM vector_collections WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&self.pool)
            .await
            .map_err(storage_error("Failed to delete collection"))?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CollectionStore for SqliteCollectionStore {
    async fn open(&self) -> Result<()> {
        if let Some(parent) = self.database_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MemoryError::Storage(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        self.run_migrations().await
    }

    async fn get(&self, chat_id: &str) -> Result<Option<StoredCollection>> {
        let row = sqlx::query_as::<_, (String, String, String)>(
            "SELECT version, last_update, payload FROM vector_collections WHERE chat_id = ?",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error("Failed to read collection"))?;

        let Some((version, last_update, payload)) = row else {
            debug!("No stored collection for {}", chat_id);
            return Ok(None);
        };

        let vectors: Vec<VectorRecord> = serde_json::from_str(&payload).map_err(|e| {
            MemoryError::Storage(format!("Corrupt collection payload for {}: {}", chat_id, e))
        })?;

        Ok(Some(StoredCollection {
            chat_id: chat_id.to_string(),
            vectors,
            last_update: decode_timestamp(&last_update)?,
            version,
        }))
    }

    async fn put(&self, collection: &StoredCollection) -> Result<()> {
        let payload = serde_json::to_string(&collection.vectors).map_err(|e| {
            MemoryError::Storage(format!("Failed to serialize collection: {}", e))
        })?;
        let vector_count = i64::try_from(collection.vectors.len()).unwrap_or(i64::MAX);

        sqlx::query(
            r#"
            INSERT INTO vector_collections (chat_id, version, last_update, vector_count, payload)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(chat_id) DO UPDATE SET
                version = excluded.version,
                last_update = excluded.last_update,
                vector_count = excluded.vector_count,
                payload = excluded.payload
            "#,
        )
        .bind(collection.chat_id.as_str())
        .bind(collection.version.as_str())
        .bind(encode_timestamp(&collection.last_update))
        .bind(vector_count)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(storage_error("Failed to write collection"))?;

        debug!(
            "Stored {} vectors for {}",
            collection.vectors.len(),
            collection.chat_id
        );
        Ok(())
    }
}
