// Explorer service - Use cases behind the HTTP surface
use crate::application::aggregator::{AggregationError, MetricAggregator};
use crate::application::metrics_loader::{AggregationSnapshot, LoadOutcome, MetricsLoader};
use crate::application::query_runner::{QueryRequest, QueryRunner};
use crate::domain::entity::{Entity, annotate};
use crate::domain::filter::{FacetMutation, FilterError, FilterSettings, FilterState};
use crate::domain::filter_pipeline::{FilterOutcome, reduce};
use crate::domain::metrics::{EntityKey, EntityKind, MetricRecord};
use crate::domain::normalizer::normalize;
use crate::domain::series::Series;
use crate::infrastructure::config::QueryTemplates;
use crate::infrastructure::time_range::{TimeRange, TimeRangeError, TimeWindow, resolve};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ExplorerError {
    #[error(transparent)]
    TimeRange(#[from] TimeRangeError),
    #[error("backend query failed: {0}")]
    Backend(String),
    #[error(transparent)]
    Aggregation(#[from] AggregationError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error("superseded by a newer request")]
    Superseded,
}

pub struct ExplorerService {
    runner: Arc<dyn QueryRunner>,
    templates: QueryTemplates,
    filter_settings: FilterSettings,
    operations: MetricsLoader,
    dependencies: MetricsLoader,
}

impl ExplorerService {
    pub fn new(
        runner: Arc<dyn QueryRunner>,
        templates: QueryTemplates,
        filter_settings: FilterSettings,
    ) -> Self {
        let aggregator = MetricAggregator::new(runner.clone());
        Self {
            runner,
            templates,
            filter_settings,
            operations: MetricsLoader::new(EntityKind::Operation, aggregator.clone()),
            dependencies: MetricsLoader::new(EntityKind::Dependency, aggregator),
        }
    }

    fn loader(&self, kind: EntityKind) -> &MetricsLoader {
        match kind {
            EntityKind::Operation => &self.operations,
            EntityKind::Dependency => &self.dependencies,
        }
    }

    fn window(range: &TimeRange) -> Result<TimeWindow, TimeRangeError> {
        resolve(range, chrono::Utc::now())
    }

    /// Run one chart query and normalize whatever shape comes back.
    pub async fn series(
        &self,
        query: &str,
        range: &TimeRange,
        label_field: Option<&str>,
    ) -> Result<Vec<Series>, ExplorerError> {
        let window = Self::window(range)?;
        let request = QueryRequest {
            query: query.to_string(),
            start_time_epoch_seconds: window.start_epoch_seconds,
            end_time_epoch_seconds: window.end_epoch_seconds,
        };

        let response = self.runner.execute(&request).await.map_err(|e| {
            tracing::error!("Series query failed: {:#}", e);
            ExplorerError::Backend(format!("{:#}", e))
        })?;

        let series = normalize(&response, label_field);
        tracing::debug!("Normalized {} series", series.len());
        Ok(series)
    }

    pub async fn load_metrics(
        &self,
        kind: EntityKind,
        entities: &[EntityKey],
        range: &TimeRange,
        vars: &HashMap<String, String>,
    ) -> Result<MetricRecord, ExplorerError> {
        let window = Self::window(range)?;
        let queries = self.templates.for_kind(kind).prepared(vars);

        match self.loader(kind).load(entities, &queries, window).await {
            LoadOutcome::Completed(result) => Ok(result?),
            LoadOutcome::Superseded => Err(ExplorerError::Superseded),
        }
    }

    pub fn metrics_snapshot(&self, kind: EntityKind) -> AggregationSnapshot {
        self.loader(kind).snapshot()
    }

    /// Annotate entities from the latest loaded metrics of `kind`, apply the
    /// mutation and re-run the filter pipeline.
    pub fn filter(
        &self,
        mut entities: Vec<Entity>,
        kind: Option<EntityKind>,
        state: FilterState,
        mutation: Option<FacetMutation>,
    ) -> Result<FilterOutcome, ExplorerError> {
        if let Some(kind) = kind {
            if let Some(records) = self.loader(kind).snapshot().records {
                annotate(&mut entities, &records);
            }
        }

        Ok(reduce(&entities, state, mutation, &self.filter_settings)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::aggregator::tests::{StubRunner, queries};
    use serde_json::json;

    fn service(responses: HashMap<String, serde_json::Value>) -> ExplorerService {
        ExplorerService::new(
            Arc::new(StubRunner::new(responses)),
            QueryTemplates {
                operation: queries(),
                dependency: queries(),
            },
            FilterSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_series_normalizes_backend_response() {
        let mut responses = HashMap::new();
        responses.insert(
            "latency".to_string(),
            json!({ "data": { "result": [
                { "metric": { "Operation": "GET /" }, "values": [[2, "4"], [1, "3"]] }
            ]}}),
        );
        let service = service(responses);

        let series = service
            .series("latency", &TimeRange::default(), None)
            .await
            .unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].name, "GET /");
        assert_eq!(series[0].points[0].timestamp, 1000);
    }

    #[tokio::test]
    async fn test_filter_uses_loaded_metrics() {
        let mut responses = HashMap::new();
        responses.insert(
            "availability".to_string(),
            json!([
                { "labels": { "Operation": "GET /" }, "value": [0, "99.99"] },
                { "labels": { "Operation": "POST /" }, "value": [0, "97.5"] }
            ]),
        );
        let service = service(responses);
        let keys = vec![EntityKey::from("GET /"), EntityKey::from("POST /")];

        service
            .load_metrics(
                EntityKind::Operation,
                &keys,
                &TimeRange::default(),
                &HashMap::new(),
            )
            .await
            .unwrap();

        let entities = keys
            .iter()
            .map(|k| Entity::new(k.clone(), k.to_string()))
            .collect();
        let outcome = service
            .filter(
                entities,
                Some(EntityKind::Operation),
                FilterState::default(),
                None,
            )
            .unwrap();

        assert_eq!(outcome.selected_entity, Some(EntityKey::from("POST /")));
        assert!(outcome.entities.iter().all(|e| e.metrics.is_some()));
    }

    #[tokio::test]
    async fn test_invalid_range_is_rejected_before_querying() {
        let service = service(HashMap::new());
        let range = TimeRange {
            from: "yesterday".to_string(),
            to: "now".to_string(),
        };

        let err = service.series("q", &range, None).await.unwrap_err();
        assert!(matches!(err, ExplorerError::TimeRange(_)));
    }
}
