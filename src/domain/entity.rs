// Filterable entity domain model
use super::metrics::{EntityKey, MetricKind, MetricRecord, MetricValues};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A row-level subject of the explorer: an operation or a dependency pair,
/// with identity, grouping attributes and (once loaded) its metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub key: EntityKey,
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub operations: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub metrics: Option<MetricValues>,
}

impl Entity {
    pub fn new(key: EntityKey, name: String) -> Self {
        Self {
            key,
            name,
            attributes: BTreeMap::new(),
            operations: Vec::new(),
            dependencies: Vec::new(),
            metrics: None,
        }
    }

    /// Metric value, or `None` when metrics are not loaded or the value is NaN.
    pub fn metric(&self, kind: MetricKind) -> Option<f64> {
        self.metrics
            .as_ref()
            .map(|m| m.get(kind))
            .filter(|v| !v.is_nan())
    }
}

/// Fill in metrics for entities that arrived without them.
pub fn annotate(entities: &mut [Entity], record: &MetricRecord) {
    for entity in entities.iter_mut().filter(|e| e.metrics.is_none()) {
        entity.metrics = record.get(&entity.key).copied();
    }
}
