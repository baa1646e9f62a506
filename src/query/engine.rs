//! Per-partition aggregation over a [`PartitionStore`].

use thiserror::Error;

use crate::storage::{
    Milliseconds, ParsePartitionKeyError, PartitionKey, PartitionStore, StorageError,
};

use super::report::{Aggregate, PartitionOutcome, PartitionReport, QueryReport};
use super::types::{AggregationKind, DateSelector};

/// Query error types.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    InvalidDate(#[from] ParsePartitionKeyError),
}

/// Answers aggregate queries against a borrowed store.
///
/// Every resolved partition is computed on its own; values are never merged
/// across days.
pub struct QueryEngine<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: PartitionStore + ?Sized> QueryEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Parse a `DDMMYYYY`/`all` selector and run the query.
    pub async fn query_str(&self, date: &str, kind: &str) -> Result<QueryReport, QueryError> {
        let selector: DateSelector = date.parse()?;
        self.query(selector, kind).await
    }

    /// Run a query. An unrecognised `kind` is reported inline for each
    /// existing partition rather than failing the whole query. For `all`, a
    /// partition that fails to read is reported inline too and the remaining
    /// partitions are still computed.
    pub async fn query(
        &self,
        selector: DateSelector,
        kind: &str,
    ) -> Result<QueryReport, QueryError> {
        let parsed = kind.parse::<AggregationKind>().ok();
        let keys = self.resolve(selector).await?;

        tracing::debug!(
            selector = %selector,
            kind = %kind,
            partitions = keys.len(),
            "Running query"
        );

        let mut partitions = Vec::with_capacity(keys.len());
        for key in keys {
            let result = match parsed {
                Some(kind) => self.compute(key, kind).await,
                None => self.invalid_kind(key, kind).await,
            };
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) if selector == DateSelector::All => {
                    tracing::error!(partition = %key, error = %e, "Failed to read partition");
                    PartitionOutcome::Unreadable {
                        error: e.to_string(),
                    }
                }
                Err(e) => return Err(e.into()),
            };
            partitions.push(PartitionReport::new(key, outcome));
        }

        Ok(QueryReport {
            selector,
            kind: kind.to_string(),
            partitions,
        })
    }

    async fn resolve(&self, selector: DateSelector) -> Result<Vec<PartitionKey>, StorageError> {
        match selector {
            DateSelector::Date(key) => Ok(vec![key]),
            DateSelector::All => {
                let mut keys = self.store.list_partitions().await?;
                keys.sort_unstable();
                Ok(keys)
            }
        }
    }

    async fn invalid_kind(
        &self,
        key: PartitionKey,
        kind: &str,
    ) -> Result<PartitionOutcome, StorageError> {
        if !self.store.partition_exists(key).await? {
            return Ok(PartitionOutcome::Missing);
        }
        tracing::warn!(partition = %key, kind = %kind, "Invalid aggregation kind");
        Ok(PartitionOutcome::InvalidKind {
            kind: kind.to_string(),
        })
    }

    async fn compute(
        &self,
        key: PartitionKey,
        kind: AggregationKind,
    ) -> Result<PartitionOutcome, StorageError> {
        if kind == AggregationKind::GetAll {
            return Ok(match self.store.read_all(key).await? {
                Some(samples) => PartitionOutcome::Records { samples },
                None => PartitionOutcome::Missing,
            });
        }

        let Some(latencies) = self.store.read_latencies(key).await? else {
            return Ok(PartitionOutcome::Missing);
        };

        let aggregates = kind.aggregates();
        let timeouts = if aggregates.contains(&AggregationKind::Timeout) {
            self.store.count_timeouts(key).await?.unwrap_or(0)
        } else {
            0
        };

        let values = aggregates
            .iter()
            .filter_map(|&k| aggregate(k, &latencies, timeouts))
            .collect();
        Ok(PartitionOutcome::Aggregates { values })
    }
}

/// Compute a single aggregate over the reply latencies of one partition.
fn aggregate(
    kind: AggregationKind,
    latencies: &[Milliseconds],
    timeouts: u64,
) -> Option<Aggregate> {
    match kind {
        AggregationKind::Min => Some(Aggregate::Min(latencies.iter().copied().min())),
        AggregationKind::Max => Some(Aggregate::Max(latencies.iter().copied().max())),
        AggregationKind::Avg => Some(Aggregate::Avg(average(latencies))),
        AggregationKind::Timeout => Some(Aggregate::Timeouts(timeouts)),
        AggregationKind::GetAll | AggregationKind::AllKinds => None,
    }
}

fn average(latencies: &[Milliseconds]) -> Option<f64> {
    if latencies.is_empty() {
        return None;
    }
    let sum: f64 = latencies.iter().map(|&ms| ms as f64).sum();
    Some(sum / latencies.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{IN_MEMORY_PATH, Sample, SqliteStore, StorageBuilder};
    use chrono::{NaiveDate, NaiveDateTime};

    fn key(s: &str) -> PartitionKey {
        s.parse().unwrap()
    }

    fn at(key: PartitionKey, second: u32) -> NaiveDateTime {
        key.date().and_hms_opt(10, 0, second).unwrap()
    }

    async fn store_with(partitions: Vec<(&str, Vec<Option<u64>>)>) -> SqliteStore {
        let store = StorageBuilder::new(IN_MEMORY_PATH).build().await.unwrap();
        for (date, latencies) in partitions {
            let k = key(date);
            let samples: Vec<Sample> = latencies
                .iter()
                .enumerate()
                .map(|(i, l)| Sample::new(at(k, i as u32), *l))
                .collect();
            store.ensure_partition(k).await.unwrap();
            store.append(k, &samples).await.unwrap();
        }
        store
    }

    fn values(report: &PartitionReport) -> &[Aggregate] {
        match &report.outcome {
            PartitionOutcome::Aggregates { values } => values,
            other => panic!("expected aggregates, got {other:?}"),
        }
    }

    #[test]
    fn test_average_empty_is_none() {
        assert_eq!(average(&[]), None);
        assert_eq!(average(&[10, 20, 30]), Some(20.0));
    }

    #[tokio::test]
    async fn test_all_kinds_excludes_timeouts() {
        let store = store_with(vec![("30092024", vec![Some(10), Some(20), None, Some(30)])]).await;
        let engine = QueryEngine::new(&store);

        let report = engine.query_str("30092024", "all").await.unwrap();
        assert_eq!(
            values(&report.partitions[0]),
            &[
                Aggregate::Min(Some(10)),
                Aggregate::Max(Some(30)),
                Aggregate::Avg(Some(20.0)),
                Aggregate::Timeouts(1),
            ]
        );
        assert_eq!(
            report.to_string(),
            "Min ping: 10ms\nMax ping: 30ms\nAverage ping: 20.00ms\nTotal timeouts: 1"
        );
    }

    #[tokio::test]
    async fn test_all_dates_are_independent_and_chronological() {
        let store = store_with(vec![
            ("01022024", vec![Some(50)]),
            ("31012024", vec![Some(10), Some(5)]),
        ])
        .await;
        let engine = QueryEngine::new(&store);

        let report = engine.query(DateSelector::All, "min").await.unwrap();
        let dates: Vec<_> = report.partitions.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![key("31012024"), key("01022024")]);
        assert_eq!(values(&report.partitions[0]), &[Aggregate::Min(Some(5))]);
        assert_eq!(values(&report.partitions[1]), &[Aggregate::Min(Some(50))]);
    }

    #[tokio::test]
    async fn test_missing_date_reports_no_data() {
        let store = store_with(vec![("30092024", vec![Some(10)])]).await;
        let engine = QueryEngine::new(&store);

        let report = engine.query_str("01012025", "avg").await.unwrap();
        assert_eq!(report.partitions[0].outcome, PartitionOutcome::Missing);
        assert_eq!(report.to_string(), "No data found for that date.");
    }

    #[tokio::test]
    async fn test_get_all_then_avg() {
        let store = store_with(vec![("30092024", vec![Some(14), None])]).await;
        let engine = QueryEngine::new(&store);

        let report = engine.query_str("30092024", "getAll").await.unwrap();
        match &report.partitions[0].outcome {
            PartitionOutcome::Records { samples } => {
                assert_eq!(samples.len(), 2);
                assert!(samples[1].is_timeout());
            }
            other => panic!("expected records, got {other:?}"),
        }
        assert!(report.to_string().ends_with("Latency: Request timeout"));

        let report = engine.query_str("30092024", "avg").await.unwrap();
        assert_eq!(values(&report.partitions[0]), &[Aggregate::Avg(Some(14.0))]);
    }

    #[tokio::test]
    async fn test_only_timeouts_yields_no_data_values() {
        let store = store_with(vec![("30092024", vec![None, None])]).await;
        let engine = QueryEngine::new(&store);

        let report = engine.query_str("30092024", "allKinds").await.unwrap();
        assert_eq!(
            values(&report.partitions[0]),
            &[
                Aggregate::Min(None),
                Aggregate::Max(None),
                Aggregate::Avg(None),
                Aggregate::Timeouts(2),
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_kind_is_inline_per_partition() {
        let store = store_with(vec![
            ("30092024", vec![Some(1)]),
            ("01102024", vec![Some(2)]),
        ])
        .await;
        let engine = QueryEngine::new(&store);

        let report = engine.query(DateSelector::All, "median").await.unwrap();
        assert_eq!(report.partitions.len(), 2);
        for partition in &report.partitions {
            assert_eq!(
                partition.outcome,
                PartitionOutcome::InvalidKind {
                    kind: "median".to_string()
                }
            );
        }

        let report = engine.query_str("02102024", "median").await.unwrap();
        assert_eq!(report.partitions[0].outcome, PartitionOutcome::Missing);
    }

    #[tokio::test]
    async fn test_all_on_empty_database() {
        let store = store_with(Vec::new()).await;
        let engine = QueryEngine::new(&store);

        let report = engine.query(DateSelector::All, "max").await.unwrap();
        assert!(report.partitions.is_empty());
        assert_eq!(report.to_string(), "No data available in the database.");
    }

    #[tokio::test]
    async fn test_unreadable_partition_does_not_hide_others() {
        let store = store_with(vec![
            ("30092024", vec![Some(10)]),
            ("01102024", vec![Some(20)]),
        ])
        .await;
        sqlx::query("INSERT INTO ping_30092024 (timestamp, latency) VALUES ('10:00:05', 'fast')")
            .execute(store.pool())
            .await
            .unwrap();
        let engine = QueryEngine::new(&store);

        let report = engine.query(DateSelector::All, "max").await.unwrap();
        assert_eq!(report.partitions.len(), 2);
        assert!(matches!(report.partitions[0].outcome, PartitionOutcome::Unreadable { .. }));
        assert_eq!(values(&report.partitions[1]), &[Aggregate::Max(Some(20))]);
        assert!(report.to_string().contains("Data for date: 01102024\nMax ping: 20ms"));

        let result = engine.query_str("30092024", "max").await;
        assert!(matches!(result, Err(QueryError::Storage(_))));
    }

    #[tokio::test]
    async fn test_invalid_date_selector() {
        let store = store_with(Vec::new()).await;
        let engine = QueryEngine::new(&store);

        let result = engine.query_str("2024-09-30", "min").await;
        assert!(matches!(result, Err(QueryError::InvalidDate(_))));
    }
}
