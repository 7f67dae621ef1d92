// Metric aggregator - fans out one query per metric kind and merges per entity
use crate::application::query_runner::{QueryRequest, QueryRunner};
use crate::domain::metrics::{EntityKey, EntityKind, MetricKind, MetricRecord, MetricRecordBuilder};
use crate::infrastructure::config::MetricQueries;
use crate::infrastructure::time_range::TimeWindow;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error};

/// Uniform failure for a whole aggregation pass.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AggregationError {
    #[error("{kind} query failed: {message}")]
    QueryFailed { kind: MetricKind, message: String },
}

impl AggregationError {
    /// Keep an error that already is an `AggregationError`, wrap anything else.
    fn from_query_failure(kind: MetricKind, err: anyhow::Error) -> Self {
        match err.downcast::<AggregationError>() {
            Ok(err) => err,
            Err(other) => AggregationError::QueryFailed {
                kind,
                message: format!("{:#}", other),
            },
        }
    }
}

#[derive(Clone)]
pub struct MetricAggregator {
    runner: Arc<dyn QueryRunner>,
}

impl MetricAggregator {
    pub fn new(runner: Arc<dyn QueryRunner>) -> Self {
        Self { runner }
    }

    /// Run all seven metric queries concurrently and merge them into one
    /// record keyed exactly by `entities`. Any failed query fails the pass,
    /// but only after every query has settled.
    pub async fn aggregate(
        &self,
        entity_kind: EntityKind,
        entities: &[EntityKey],
        queries: &MetricQueries,
        window: TimeWindow,
    ) -> Result<MetricRecord, AggregationError> {
        let builder = MetricRecordBuilder::new(entity_kind, entities);

        let pending = MetricKind::ALL.map(|kind| {
            let request = QueryRequest {
                query: queries.get(kind).to_string(),
                start_time_epoch_seconds: window.start_epoch_seconds,
                end_time_epoch_seconds: window.end_epoch_seconds,
            };
            let runner = self.runner.clone();
            async move { (kind, runner.execute(&request).await) }
        });
        let results = join_all(pending).await;

        let mut responses = Vec::with_capacity(results.len());
        for (kind, result) in results {
            match result {
                Ok(response) => responses.push((kind, response)),
                Err(e) => {
                    let err = AggregationError::from_query_failure(kind, e);
                    error!("Metric aggregation for {} entities failed: {}", entities.len(), err);
                    return Err(err);
                }
            }
        }

        let record = responses
            .iter()
            .fold(builder, |builder, (kind, response)| builder.merge(*kind, response))
            .build();

        debug!(
            "Aggregated {} metrics for {} {:?} entities",
            MetricKind::ALL.len(),
            record.len(),
            entity_kind
        );
        Ok(record)
    }
}
