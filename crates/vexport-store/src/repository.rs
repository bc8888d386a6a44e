//! Export record repository.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tracing::debug;

use vexport_models::{ExportId, ExportRecord, ExportStatus};

use crate::error::{StoreError, StoreResult};

/// Durable storage for export records.
///
/// The orchestrator is the only component that updates in-flight status;
/// everything else creates, reads or deletes.
#[async_trait]
pub trait ExportRepository: Send + Sync {
    /// Persist a new record.
    async fn create(&self, record: &ExportRecord) -> StoreResult<()>;

    /// Look up a record by id.
    async fn find(&self, id: &ExportId) -> StoreResult<Option<ExportRecord>>;

    /// Persist an updated record. Errors with `NotFound` if it was
    /// deleted concurrently.
    async fn update(&self, record: &ExportRecord) -> StoreResult<()>;

    /// Delete a record. Deleting a missing record is not an error.
    async fn delete(&self, id: &ExportId) -> StoreResult<()>;

    /// Most recently created records, newest first.
    async fn list_recent(&self, limit: usize) -> StoreResult<Vec<ExportRecord>>;

    /// Records created strictly before the cutoff.
    async fn list_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<ExportRecord>>;

    /// `in_progress` records not updated since the cutoff (orphans from a
    /// crashed worker).
    async fn list_stuck_in_progress(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<ExportRecord>>;
}

const RECORD_PREFIX: &str = "vexport:export:";
const CREATED_INDEX: &str = "vexport:exports:created";

/// Redis-backed repository: one JSON document per record plus a sorted
/// set indexing ids by creation time.
pub struct RedisExportRepository {
    client: redis::Client,
}

impl RedisExportRepository {
    pub fn new(redis_url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub fn from_env() -> StoreResult<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        Self::new(&url)
    }

    fn record_key(id: &ExportId) -> String {
        format!("{RECORD_PREFIX}{id}")
    }

    async fn conn(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    async fn load_many(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        ids: Vec<String>,
    ) -> StoreResult<Vec<ExportRecord>> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            let raw: Option<String> = conn.get(format!("{RECORD_PREFIX}{id}")).await?;
            match raw {
                Some(json) => records.push(serde_json::from_str(&json)?),
                // Index entry outlived its record; drop it.
                None => {
                    let _: () = conn.zrem(CREATED_INDEX, &id).await?;
                }
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl ExportRepository for RedisExportRepository {
    async fn create(&self, record: &ExportRecord) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(record)?;

        let _: () = conn.set(Self::record_key(&record.id), payload).await?;
        let _: () = conn
            .zadd(
                CREATED_INDEX,
                record.id.as_str(),
                record.created_at.timestamp_millis(),
            )
            .await?;

        debug!("Created export record {}", record.id);
        Ok(())
    }

    async fn find(&self, id: &ExportId) -> StoreResult<Option<ExportRecord>> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(Self::record_key(id)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, record: &ExportRecord) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let key = Self::record_key(&record.id);

        let exists: bool = conn.exists(&key).await?;
        if !exists {
            return Err(StoreError::not_found(record.id.as_str()));
        }

        let payload = serde_json::to_string(record)?;
        let _: () = conn.set(key, payload).await?;
        Ok(())
    }

    async fn delete(&self, id: &ExportId) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.del(Self::record_key(id)).await?;
        let _: () = conn.zrem(CREATED_INDEX, id.as_str()).await?;
        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> StoreResult<Vec<ExportRecord>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn
            .zrevrange(CREATED_INDEX, 0, limit.saturating_sub(1) as isize)
            .await?;
        self.load_many(&mut conn, ids).await
    }

    async fn list_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<ExportRecord>> {
        let mut conn = self.conn().await?;
        let max = cutoff.timestamp_millis() - 1;
        let ids: Vec<String> = conn.zrangebyscore(CREATED_INDEX, "-inf", max).await?;
        self.load_many(&mut conn, ids).await
    }

    async fn list_stuck_in_progress(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<ExportRecord>> {
        // The in_progress population is tiny (concurrency is 1), so a
        // scan over the index is fine.
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn.zrange(CREATED_INDEX, 0, -1).await?;
        let records = self.load_many(&mut conn, ids).await?;
        Ok(records
            .into_iter()
            .filter(|r| r.status == ExportStatus::InProgress && r.updated_at < cutoff)
            .collect())
    }
}

/// In-memory repository for tests and local development.
#[derive(Default)]
pub struct MemoryExportRepository {
    records: Arc<RwLock<HashMap<String, ExportRecord>>>,
}

impl MemoryExportRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExportRepository for MemoryExportRepository {
    async fn create(&self, record: &ExportRecord) -> StoreResult<()> {
        self.records
            .write()
            .await
            .insert(record.id.as_str().to_string(), record.clone());
        Ok(())
    }

    async fn find(&self, id: &ExportId) -> StoreResult<Option<ExportRecord>> {
        Ok(self.records.read().await.get(id.as_str()).cloned())
    }

    async fn update(&self, record: &ExportRecord) -> StoreResult<()> {
        let mut records = self.records.write().await;
        if !records.contains_key(record.id.as_str()) {
            return Err(StoreError::not_found(record.id.as_str()));
        }
        records.insert(record.id.as_str().to_string(), record.clone());
        Ok(())
    }

    async fn delete(&self, id: &ExportId) -> StoreResult<()> {
        self.records.write().await.remove(id.as_str());
        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> StoreResult<Vec<ExportRecord>> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn list_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<ExportRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.created_at < cutoff)
            .cloned()
            .collect())
    }

    async fn list_stuck_in_progress(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<ExportRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.status == ExportStatus::InProgress && r.updated_at < cutoff)
            .cloned()
            .collect())
    }
}
