// Metrics loader - last-requested-wins aggregation state per entity kind
use crate::application::aggregator::{AggregationError, MetricAggregator};
use crate::domain::metrics::{EntityKey, EntityKind, MetricRecord};
use crate::infrastructure::config::MetricQueries;
use crate::infrastructure::time_range::TimeWindow;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// What the presentation layer sees for one entity kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationSnapshot {
    pub generation: u64,
    pub loading: bool,
    pub records: Option<MetricRecord>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Completed(Result<MetricRecord, AggregationError>),
    /// A newer load started before this one finished; its result was dropped
    Superseded,
}

pub struct MetricsLoader {
    entity_kind: EntityKind,
    aggregator: MetricAggregator,
    generation: AtomicU64,
    snapshot: watch::Sender<AggregationSnapshot>,
}

impl MetricsLoader {
    pub fn new(entity_kind: EntityKind, aggregator: MetricAggregator) -> Self {
        let (snapshot, _) = watch::channel(AggregationSnapshot::default());
        Self {
            entity_kind,
            aggregator,
            generation: AtomicU64::new(0),
            snapshot,
        }
    }

    pub fn snapshot(&self) -> AggregationSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Run a fresh aggregation pass. Earlier passes still in flight are not
    /// cancelled, but their results are discarded when they arrive.
    pub async fn load(
        &self,
        entities: &[EntityKey],
        queries: &MetricQueries,
        window: TimeWindow,
    ) -> LoadOutcome {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.snapshot.send_modify(|s| {
            s.generation = generation;
            s.loading = true;
        });

        let result = self
            .aggregator
            .aggregate(self.entity_kind, entities, queries, window)
            .await;

        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(
                "Discarding superseded {:?} aggregation pass {}",
                self.entity_kind,
                generation
            );
            return LoadOutcome::Superseded;
        }

        self.snapshot.send_modify(|s| {
            s.loading = false;
            match &result {
                Ok(records) => {
                    s.records = Some(records.clone());
                    s.error = None;
                }
                Err(e) => {
                    s.records = None;
                    s.error = Some(e.to_string());
                }
            }
        });

        LoadOutcome::Completed(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::aggregator::tests::{StubRunner, queries};
    use crate::application::query_runner::{QueryRequest, QueryRunner};
    use crate::domain::response::RawResponse;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Notify;

    fn window() -> TimeWindow {
        TimeWindow {
            start_epoch_seconds: 0,
            end_epoch_seconds: 60,
        }
    }

    /// Holds every query for the first window until released.
    struct GatedRunner {
        gate: Notify,
        inner: StubRunner,
    }

    #[async_trait]
    impl QueryRunner for GatedRunner {
        async fn execute(&self, request: &QueryRequest) -> anyhow::Result<RawResponse> {
            if request.start_time_epoch_seconds == 0 {
                self.gate.notified().await;
            }
            self.inner.execute(request).await
        }
    }

    #[tokio::test]
    async fn test_completed_load_updates_snapshot() {
        let mut responses = HashMap::new();
        responses.insert(
            "requests".to_string(),
            json!([{ "labels": { "Operation": "opA" }, "value": [0, "12"] }]),
        );
        let aggregator = MetricAggregator::new(Arc::new(StubRunner::new(responses)));
        let loader = MetricsLoader::new(EntityKind::Operation, aggregator);

        let outcome = loader.load(&[EntityKey::from("opA")], &queries(), window()).await;
        assert!(matches!(outcome, LoadOutcome::Completed(Ok(_))));

        let snapshot = loader.snapshot();
        assert_eq!(snapshot.generation, 1);
        assert!(!snapshot.loading);
        assert_eq!(snapshot.records.unwrap()[&EntityKey::from("opA")].request_count, 12.0);
    }

    #[tokio::test]
    async fn test_failed_load_reports_error() {
        let mut runner = StubRunner::new(HashMap::new());
        runner.failing = Some("p99".to_string());
        let loader = MetricsLoader::new(
            EntityKind::Operation,
            MetricAggregator::new(Arc::new(runner)),
        );

        let outcome = loader.load(&[EntityKey::from("opA")], &queries(), window()).await;
        assert!(matches!(outcome, LoadOutcome::Completed(Err(_))));

        let snapshot = loader.snapshot();
        assert!(!snapshot.loading);
        assert!(snapshot.records.is_none());
        assert!(snapshot.error.unwrap().contains("p99Latency"));
    }

    #[tokio::test]
    async fn test_last_requested_wins() {
        let runner = Arc::new(GatedRunner {
            gate: Notify::new(),
            inner: StubRunner::new(HashMap::new()),
        });
        let loader = Arc::new(MetricsLoader::new(
            EntityKind::Operation,
            MetricAggregator::new(runner.clone()),
        ));

        let stale = {
            let loader = loader.clone();
            tokio::spawn(async move {
                loader
                    .load(&[EntityKey::from("old")], &queries(), window())
                    .await
            })
        };
        // Let the first pass dispatch and park on the gate
        while loader.snapshot().generation < 1 {
            tokio::task::yield_now().await;
        }

        let newer = TimeWindow {
            start_epoch_seconds: 60,
            end_epoch_seconds: 120,
        };
        let fresh = loader.load(&[EntityKey::from("new")], &queries(), newer).await;
        assert!(matches!(fresh, LoadOutcome::Completed(Ok(_))));

        runner.gate.notify_waiters();
        assert_eq!(stale.await.unwrap(), LoadOutcome::Superseded);

        let snapshot = loader.snapshot();
        assert_eq!(snapshot.generation, 2);
        let keys: Vec<EntityKey> = snapshot.records.unwrap().keys().cloned().collect();
        assert_eq!(keys, vec![EntityKey::from("new")]);
    }
}
