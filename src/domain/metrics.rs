// Per-entity metric domain models
use super::response::RawResponse;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Sub-key substituted when a dependency row has no remote operation.
pub const UNKNOWN_OPERATION: &str = "unknown";

const OPERATION_LABELS: &[&str] = &["Operation", "operation"];
const REMOTE_SERVICE_LABELS: &[&str] = &["RemoteService", "remoteService", "remote_service"];
const REMOTE_OPERATION_LABELS: &[&str] = &["RemoteOperation", "remoteOperation", "remote_operation"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricKind {
    P50Latency,
    P90Latency,
    P99Latency,
    FaultRate,
    ErrorRate,
    Availability,
    RequestCount,
}

impl MetricKind {
    pub const ALL: [MetricKind; 7] = [
        MetricKind::P50Latency,
        MetricKind::P90Latency,
        MetricKind::P99Latency,
        MetricKind::FaultRate,
        MetricKind::ErrorRate,
        MetricKind::Availability,
        MetricKind::RequestCount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::P50Latency => "p50Latency",
            MetricKind::P90Latency => "p90Latency",
            MetricKind::P99Latency => "p99Latency",
            MetricKind::FaultRate => "faultRate",
            MetricKind::ErrorRate => "errorRate",
            MetricKind::Availability => "availability",
            MetricKind::RequestCount => "requestCount",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Operation,
    Dependency,
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "operation" | "operations" => Ok(EntityKind::Operation),
            "dependency" | "dependencies" => Ok(EntityKind::Dependency),
            other => Err(format!("unknown entity kind: {}", other)),
        }
    }
}

impl EntityKind {
    /// Compose the entity key for a row's labels.
    ///
    /// Operations are keyed by operation name. Dependencies are keyed by
    /// `remoteService:remoteOperation`, with [`UNKNOWN_OPERATION`] standing in
    /// for a missing remote operation.
    pub fn key_for(&self, labels: &BTreeMap<String, String>) -> Option<EntityKey> {
        let first = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| labels.get(*k))
                .filter(|v| !v.is_empty())
        };

        match self {
            EntityKind::Operation => first(OPERATION_LABELS).map(|op| EntityKey::from(op.as_str())),
            EntityKind::Dependency => {
                let service = first(REMOTE_SERVICE_LABELS)?;
                let operation = first(REMOTE_OPERATION_LABELS)
                    .map(String::as_str)
                    .unwrap_or(UNKNOWN_OPERATION);
                Some(EntityKey::dependency(service, operation))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn dependency(service: &str, remote_operation: &str) -> Self {
        Self(format!("{}:{}", service, remote_operation))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One value per [`MetricKind`], zero until a response fills it in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricValues {
    pub p50_latency: f64,
    pub p90_latency: f64,
    pub p99_latency: f64,
    pub fault_rate: f64,
    pub error_rate: f64,
    pub availability: f64,
    pub request_count: f64,
}

impl MetricValues {
    pub fn get(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::P50Latency => self.p50_latency,
            MetricKind::P90Latency => self.p90_latency,
            MetricKind::P99Latency => self.p99_latency,
            MetricKind::FaultRate => self.fault_rate,
            MetricKind::ErrorRate => self.error_rate,
            MetricKind::Availability => self.availability,
            MetricKind::RequestCount => self.request_count,
        }
    }

    pub fn set(&mut self, kind: MetricKind, value: f64) {
        let slot = match kind {
            MetricKind::P50Latency => &mut self.p50_latency,
            MetricKind::P90Latency => &mut self.p90_latency,
            MetricKind::P99Latency => &mut self.p99_latency,
            MetricKind::FaultRate => &mut self.fault_rate,
            MetricKind::ErrorRate => &mut self.error_rate,
            MetricKind::Availability => &mut self.availability,
            MetricKind::RequestCount => &mut self.request_count,
        };
        *slot = value;
    }
}

pub type MetricRecord = BTreeMap<EntityKey, MetricValues>;

/// Builds a [`MetricRecord`] from a fixed entity set, one response at a time.
///
/// The key set is fixed at construction: merging never adds entities.
#[derive(Debug, Clone)]
pub struct MetricRecordBuilder {
    entity_kind: EntityKind,
    record: MetricRecord,
}

impl MetricRecordBuilder {
    pub fn new(entity_kind: EntityKind, entities: &[EntityKey]) -> Self {
        let record = entities
            .iter()
            .map(|key| (key.clone(), MetricValues::default()))
            .collect();
        Self {
            entity_kind,
            record,
        }
    }

    /// Write `kind` for every known entity present in `response`.
    /// NaN values become 0; rows for unknown entities are ignored.
    pub fn merge(mut self, kind: MetricKind, response: &RawResponse) -> Self {
        let mut unknown = 0usize;

        for observation in response.observations() {
            let Some(key) = self.entity_kind.key_for(&observation.labels) else {
                unknown += 1;
                continue;
            };
            match self.record.get_mut(&key) {
                Some(values) => {
                    let value = if observation.value.is_nan() {
                        0.0
                    } else {
                        observation.value
                    };
                    values.set(kind, value);
                }
                None => unknown += 1,
            }
        }

        if unknown > 0 {
            tracing::debug!("{}: skipped {} rows for unknown entities", kind, unknown);
        }

        self
    }

    pub fn build(self) -> MetricRecord {
        self.record
    }
}
