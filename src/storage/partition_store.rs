//! Day-partitioned sample store.
//!
//! [`PartitionStore`] is the seam between the pipeline and persistence:
//! append-only, keyed by calendar date, with partitions created lazily.
//! [`SqliteStore`] implements it with one SQLite table per day.

use chrono::NaiveDateTime;
use sqlx::Row;
use sqlx::sqlite::SqlitePool as SqlxPool;

use crate::storage::StorageError;
use crate::storage::db::SqlitePool;
use crate::storage::schema::{
    LIST_PARTITION_TABLES_SQL, PARTITION_EXISTS_SQL, TIMEOUT_MARKER, count_timeouts_sql,
    create_partition_sql, decode_latency, decode_time, encode_latency, encode_time,
    insert_sample_sql, select_all_sql, select_latencies_sql,
};
use crate::storage::types::{Milliseconds, PartitionKey, Sample};

/// Durable append-only storage keyed by calendar date.
///
/// Reads against a partition that does not exist return `Ok(None)` rather
/// than an error. There is no update or delete.
#[async_trait::async_trait]
pub trait PartitionStore: Send + Sync {
    /// Create the partition if it does not exist. Idempotent.
    async fn ensure_partition(&self, key: PartitionKey) -> Result<(), StorageError>;

    /// Atomically append all samples, in order, to the partition.
    ///
    /// Creates the partition if needed. Every sample must belong to `key`
    /// (its capture date). Appending an empty slice is a no-op. Durable once
    /// this returns `Ok`.
    async fn append(&self, key: PartitionKey, samples: &[Sample]) -> Result<(), StorageError>;

    /// All existing partition keys, in no particular order.
    async fn list_partitions(&self) -> Result<Vec<PartitionKey>, StorageError>;

    /// Whether the partition exists.
    async fn partition_exists(&self, key: PartitionKey) -> Result<bool, StorageError>;

    /// Every sample in arrival order, timeouts included.
    async fn read_all(&self, key: PartitionKey) -> Result<Option<Vec<Sample>>, StorageError>;

    /// Latencies of non-timeout samples, in arrival order.
    async fn read_latencies(
        &self,
        key: PartitionKey,
    ) -> Result<Option<Vec<Milliseconds>>, StorageError>;

    /// Number of timeout samples.
    async fn count_timeouts(&self, key: PartitionKey) -> Result<Option<u64>, StorageError>;

    /// Release the underlying handle. Later calls fail with [`StorageError::Closed`].
    async fn close(&self);
}

/// SQLite-backed [`PartitionStore`].
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("closed", &self.pool.is_closed())
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn live(&self) -> Result<&SqlxPool, StorageError> {
        if self.pool.is_closed() {
            return Err(StorageError::Closed);
        }
        Ok(self.pool.inner())
    }

    /// Whether [`PartitionStore::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlxPool {
        self.pool.inner()
    }
}

#[async_trait::async_trait]
impl PartitionStore for SqliteStore {
    async fn ensure_partition(&self, key: PartitionKey) -> Result<(), StorageError> {
        sqlx::query(&create_partition_sql(&key))
            .execute(self.live()?)
            .await?;
        tracing::debug!(partition = %key, "Partition ensured");
        Ok(())
    }

    async fn append(&self, key: PartitionKey, samples: &[Sample]) -> Result<(), StorageError> {
        if samples.is_empty() {
            return Ok(());
        }
        if let Some(stray) = samples.iter().find(|s| s.partition_key() != key) {
            return Err(StorageError::InvalidData(format!(
                "sample captured at {} does not belong to partition {}",
                stray.captured_at, key
            )));
        }

        let insert = insert_sample_sql(&key);
        let mut tx = self.live()?.begin().await?;

        sqlx::query(&create_partition_sql(&key))
            .execute(&mut *tx)
            .await?;
        for sample in samples {
            sqlx::query(&insert)
                .bind(encode_time(sample.time_of_day()))
                .bind(encode_latency(sample.latency))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        tracing::debug!(partition = %key, rows = samples.len(), "Samples appended");
        Ok(())
    }

    async fn list_partitions(&self) -> Result<Vec<PartitionKey>, StorageError> {
        let rows = sqlx::query(LIST_PARTITION_TABLES_SQL)
            .fetch_all(self.live()?)
            .await?;

        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get(0)?;
            match PartitionKey::from_table_name(&name) {
                Some(key) => keys.push(key),
                None => tracing::debug!(table = %name, "Skipping non-partition table"),
            }
        }
        Ok(keys)
    }

    async fn partition_exists(&self, key: PartitionKey) -> Result<bool, StorageError> {
        let (count,): (i64,) = sqlx::query_as(PARTITION_EXISTS_SQL)
            .bind(key.table_name())
            .fetch_one(self.live()?)
            .await?;
        Ok(count > 0)
    }

    async fn read_all(&self, key: PartitionKey) -> Result<Option<Vec<Sample>>, StorageError> {
        if !self.partition_exists(key).await? {
            return Ok(None);
        }

        let rows = sqlx::query(&select_all_sql(&key))
            .fetch_all(self.live()?)
            .await?;

        let mut samples = Vec::with_capacity(rows.len());
        for row in rows {
            let timestamp: Option<String> = row.try_get(0)?;
            let latency: Option<String> = row.try_get(1)?;
            let (Some(timestamp), Some(latency)) = (timestamp, latency) else {
                return Err(StorageError::InvalidData(format!(
                    "partition {key} contains a row with missing columns"
                )));
            };
            let captured_at = NaiveDateTime::new(key.date(), decode_time(&timestamp)?);
            samples.push(Sample::new(captured_at, decode_latency(&latency)?));
        }
        Ok(Some(samples))
    }

    async fn read_latencies(
        &self,
        key: PartitionKey,
    ) -> Result<Option<Vec<Milliseconds>>, StorageError> {
        if !self.partition_exists(key).await? {
            return Ok(None);
        }

        let rows = sqlx::query(&select_latencies_sql(&key))
            .bind(TIMEOUT_MARKER)
            .fetch_all(self.live()?)
            .await?;

        let mut latencies = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: String = row.try_get(0)?;
            if let Some(ms) = decode_latency(&raw)? {
                latencies.push(ms);
            }
        }
        Ok(Some(latencies))
    }

    async fn count_timeouts(&self, key: PartitionKey) -> Result<Option<u64>, StorageError> {
        if !self.partition_exists(key).await? {
            return Ok(None);
        }

        let (count,): (i64,) = sqlx::query_as(&count_timeouts_sql(&key))
            .bind(TIMEOUT_MARKER)
            .fetch_one(self.live()?)
            .await?;
        Ok(Some(count.max(0) as u64))
    }

    async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
            tracing::debug!("Store handle closed");
        }
    }
}
