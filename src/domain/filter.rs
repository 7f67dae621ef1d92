// Faceted filter state, facets and mutations
use super::metrics::{EntityKey, MetricKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Smallest spread a range facet is allowed to have.
pub const BOUNDS_EPSILON: f64 = 1.0;

/// Bounds used when the filtered subset has no values for a metric.
pub const DEFAULT_LATENCY_BOUNDS: Bounds = Bounds::new(0.0, 10_000.0);
pub const DEFAULT_REQUEST_COUNT_BOUNDS: Bounds = Bounds::new(0.0, 1_000_000.0);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Floor of the minimum and ceiling of the maximum, widened so that
    /// `max >= min + BOUNDS_EPSILON`. Falls back when there are no values.
    pub fn from_values<I>(values: I, fallback: Bounds) -> Bounds
    where
        I: IntoIterator<Item = f64>,
    {
        let (min, max) = values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });

        if min > max {
            return fallback;
        }

        let min = min.floor();
        let max = max.ceil();
        if max < min + BOUNDS_EPSILON {
            Bounds::new(min, min + BOUNDS_EPSILON)
        } else {
            Bounds::new(min, max)
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyPercentile {
    P50,
    P90,
    #[default]
    P99,
}

impl LatencyPercentile {
    pub fn metric_kind(&self) -> MetricKind {
        match self {
            LatencyPercentile::P50 => MetricKind::P50Latency,
            LatencyPercentile::P90 => MetricKind::P90Latency,
            LatencyPercentile::P99 => MetricKind::P99Latency,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LatencyPercentile::P50 => "p50",
            LatencyPercentile::P90 => "p90",
            LatencyPercentile::P99 => "p99",
        }
    }
}

/// Lower and upper cut points, in percent, splitting a rate into three buckets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub low: f64,
    pub high: f64,
}

impl Thresholds {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn bucket_of(&self, value: f64) -> ThresholdBucket {
        if value < self.low {
            ThresholdBucket::Below
        } else if value < self.high {
            ThresholdBucket::Between
        } else {
            ThresholdBucket::AtOrAbove
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ThresholdBucket {
    Below,
    Between,
    AtOrAbove,
}

impl ThresholdBucket {
    pub fn label(&self, thresholds: &Thresholds) -> String {
        match self {
            ThresholdBucket::Below => format!("< {}%", thresholds.low),
            ThresholdBucket::Between => format!("{}% - {}%", thresholds.low, thresholds.high),
            ThresholdBucket::AtOrAbove => format!(">= {}%", thresholds.high),
        }
    }
}

impl std::str::FromStr for ThresholdBucket {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "below" => Ok(ThresholdBucket::Below),
            "between" => Ok(ThresholdBucket::Between),
            "atOrAbove" => Ok(ThresholdBucket::AtOrAbove),
            other => Err(FilterError::UnknownBucket(other.to_string())),
        }
    }
}

/// Filter tunables loaded from configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Metric whose minimum picks the default selection
    pub health_metric: MetricKind,
    pub availability: Thresholds,
    pub fault_rate: Thresholds,
    pub error_rate: Thresholds,
    pub latency_unit: String,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            health_metric: MetricKind::Availability,
            availability: Thresholds::new(99.0, 99.9),
            fault_rate: Thresholds::new(1.0, 5.0),
            error_rate: Thresholds::new(1.0, 5.0),
            latency_unit: "ms".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    #[default]
    Initial,
    Loaded,
    Filtered,
}

/// Selected range plus the bounds it was last rebased against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeFacet {
    /// `None` means "follow the bounds"
    pub selected: Option<Bounds>,
    pub bounds: Option<Bounds>,
}

/// Everything a filter session carries between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterState {
    pub search: String,
    pub names: BTreeSet<String>,
    pub operations: BTreeSet<String>,
    pub dependencies: BTreeSet<String>,
    pub attributes: BTreeMap<String, BTreeSet<String>>,
    pub availability: BTreeSet<ThresholdBucket>,
    pub fault_rate: BTreeSet<ThresholdBucket>,
    pub error_rate: BTreeSet<ThresholdBucket>,
    pub percentile: LatencyPercentile,
    /// Percentile the latency bounds were computed for
    pub bounds_percentile: Option<LatencyPercentile>,
    pub latency: RangeFacet,
    pub request_count: RangeFacet,
    pub selected_entity: Option<EntityKey>,
    pub auto_selected: bool,
    pub phase: SessionPhase,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "facet", content = "key", rename_all = "camelCase")]
pub enum FacetId {
    Search,
    Names,
    Operations,
    Dependencies,
    Attribute(String),
    Availability,
    FaultRate,
    ErrorRate,
    Latency,
    RequestCount,
}

impl fmt::Display for FacetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacetId::Search => f.write_str("search"),
            FacetId::Names => f.write_str("names"),
            FacetId::Operations => f.write_str("operations"),
            FacetId::Dependencies => f.write_str("dependencies"),
            FacetId::Attribute(key) => write!(f, "attribute:{}", key),
            FacetId::Availability => f.write_str("availability"),
            FacetId::FaultRate => f.write_str("faultRate"),
            FacetId::ErrorRate => f.write_str("errorRate"),
            FacetId::Latency => f.write_str("latency"),
            FacetId::RequestCount => f.write_str("requestCount"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RangeFacetId {
    Latency,
    RequestCount,
}

/// A user interaction translated into a state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FacetMutation {
    Search { query: String },
    Toggle { facet: FacetId, value: String },
    SetRange { facet: RangeFacetId, min: f64, max: f64 },
    SetPercentile { percentile: LatencyPercentile },
    Clear { facet: FacetId },
    ClearAll,
    Select { entity: Option<EntityKey> },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    #[error("facet {0} cannot be toggled")]
    UnsupportedToggle(FacetId),
    #[error("unknown threshold bucket: {0}")]
    UnknownBucket(String),
    #[error("invalid range {min}..{max}")]
    InvalidRange { min: f64, max: f64 },
}

/// One active facet, as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Badge {
    pub facet: FacetId,
    pub label: String,
    pub values: Vec<String>,
}

fn toggle<T: Ord>(set: &mut BTreeSet<T>, value: T) {
    if !set.remove(&value) {
        set.insert(value);
    }
}

impl FilterState {
    fn range_mut(&mut self, facet: RangeFacetId) -> &mut RangeFacet {
        match facet {
            RangeFacetId::Latency => &mut self.latency,
            RangeFacetId::RequestCount => &mut self.request_count,
        }
    }

    pub fn apply(&mut self, mutation: FacetMutation) -> Result<(), FilterError> {
        match mutation {
            FacetMutation::Search { query } => self.search = query,
            FacetMutation::Toggle { facet, value } => self.toggle(facet, value)?,
            FacetMutation::SetRange { facet, min, max } => {
                // Written as a negation so NaN is rejected too
                if !(min <= max) {
                    return Err(FilterError::InvalidRange { min, max });
                }
                self.range_mut(facet).selected = Some(Bounds::new(min, max));
            }
            FacetMutation::SetPercentile { percentile } => self.percentile = percentile,
            FacetMutation::Clear { facet } => self.clear(&facet),
            FacetMutation::ClearAll => self.clear_all(),
            FacetMutation::Select { entity } => {
                self.selected_entity = entity;
                // An explicit choice ends the default-selection heuristic
                self.auto_selected = true;
            }
        }
        Ok(())
    }

    fn toggle(&mut self, facet: FacetId, value: String) -> Result<(), FilterError> {
        match facet {
            FacetId::Names => toggle(&mut self.names, value),
            FacetId::Operations => toggle(&mut self.operations, value),
            FacetId::Dependencies => toggle(&mut self.dependencies, value),
            FacetId::Attribute(key) => {
                let selected = self.attributes.entry(key).or_default();
                toggle(selected, value);
                self.attributes.retain(|_, values| !values.is_empty());
            }
            FacetId::Availability => toggle(&mut self.availability, value.parse()?),
            FacetId::FaultRate => toggle(&mut self.fault_rate, value.parse()?),
            FacetId::ErrorRate => toggle(&mut self.error_rate, value.parse()?),
            other @ (FacetId::Search | FacetId::Latency | FacetId::RequestCount) => {
                return Err(FilterError::UnsupportedToggle(other));
            }
        }
        Ok(())
    }

    /// Reset one facet to its default.
    pub fn clear(&mut self, facet: &FacetId) {
        match facet {
            FacetId::Search => self.search.clear(),
            FacetId::Names => self.names.clear(),
            FacetId::Operations => self.operations.clear(),
            FacetId::Dependencies => self.dependencies.clear(),
            FacetId::Attribute(key) => {
                self.attributes.remove(key);
            }
            FacetId::Availability => self.availability.clear(),
            FacetId::FaultRate => self.fault_rate.clear(),
            FacetId::ErrorRate => self.error_rate.clear(),
            FacetId::Latency => self.latency.selected = None,
            FacetId::RequestCount => self.request_count.selected = None,
        }
    }

    /// Reset every facet. Percentile, selection and session progress survive.
    pub fn clear_all(&mut self) {
        self.search.clear();
        self.names.clear();
        self.operations.clear();
        self.dependencies.clear();
        self.attributes.clear();
        self.availability.clear();
        self.fault_rate.clear();
        self.error_rate.clear();
        self.latency.selected = None;
        self.request_count.selected = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_floor_and_ceil() {
        let bounds = Bounds::from_values([120.4, 340.2, 80.9], DEFAULT_LATENCY_BOUNDS);
        assert_eq!(bounds, Bounds::new(80.0, 341.0));

        let exact = Bounds::from_values([120.0, 340.0, 80.0], DEFAULT_LATENCY_BOUNDS);
        assert_eq!(exact, Bounds::new(80.0, 340.0));
    }

    #[test]
    fn test_bounds_degenerate_and_empty() {
        assert_eq!(
            Bounds::from_values([42.0, 42.0], DEFAULT_LATENCY_BOUNDS),
            Bounds::new(42.0, 43.0)
        );
        assert_eq!(
            Bounds::from_values(Vec::<f64>::new(), DEFAULT_REQUEST_COUNT_BOUNDS),
            DEFAULT_REQUEST_COUNT_BOUNDS
        );
        assert_eq!(
            Bounds::from_values([f64::NAN], DEFAULT_LATENCY_BOUNDS),
            DEFAULT_LATENCY_BOUNDS
        );
    }

    #[test]
    fn test_threshold_buckets_are_disjoint() {
        let thresholds = Thresholds::new(99.0, 99.9);
        assert_eq!(thresholds.bucket_of(98.99), ThresholdBucket::Below);
        assert_eq!(thresholds.bucket_of(99.0), ThresholdBucket::Between);
        assert_eq!(thresholds.bucket_of(99.89), ThresholdBucket::Between);
        assert_eq!(thresholds.bucket_of(99.9), ThresholdBucket::AtOrAbove);
        assert_eq!(ThresholdBucket::Between.label(&thresholds), "99% - 99.9%");
    }

    #[test]
    fn test_toggle_and_clear() {
        let mut state = FilterState::default();
        let toggle_env = |value: &str| FacetMutation::Toggle {
            facet: FacetId::Attribute("environment".to_string()),
            value: value.to_string(),
        };

        state.apply(toggle_env("prod")).unwrap();
        state.apply(toggle_env("beta")).unwrap();
        state.apply(toggle_env("prod")).unwrap();
        assert_eq!(state.attributes["environment"].len(), 1);

        state.apply(toggle_env("beta")).unwrap();
        assert!(state.attributes.is_empty());

        state
            .apply(FacetMutation::Toggle {
                facet: FacetId::FaultRate,
                value: "atOrAbove".to_string(),
            })
            .unwrap();
        assert!(state.fault_rate.contains(&ThresholdBucket::AtOrAbove));

        state.apply(FacetMutation::Clear { facet: FacetId::FaultRate }).unwrap();
        assert!(state.fault_rate.is_empty());
    }

    #[test]
    fn test_rejected_mutations() {
        let mut state = FilterState::default();
        assert_eq!(
            state.apply(FacetMutation::Toggle {
                facet: FacetId::Latency,
                value: "1".to_string()
            }),
            Err(FilterError::UnsupportedToggle(FacetId::Latency))
        );
        assert_eq!(
            state.apply(FacetMutation::Toggle {
                facet: FacetId::Availability,
                value: "sideways".to_string()
            }),
            Err(FilterError::UnknownBucket("sideways".to_string()))
        );
        assert!(state
            .apply(FacetMutation::SetRange {
                facet: RangeFacetId::Latency,
                min: 10.0,
                max: 5.0
            })
            .is_err());
        assert_eq!(state, FilterState::default());
    }

    #[test]
    fn test_mutation_wire_format() {
        let mutation: FacetMutation = serde_json::from_str(
            r#"{ "type": "toggle", "facet": { "facet": "attribute", "key": "environment" }, "value": "prod" }"#,
        )
        .unwrap();
        assert_eq!(
            mutation,
            FacetMutation::Toggle {
                facet: FacetId::Attribute("environment".to_string()),
                value: "prod".to_string(),
            }
        );

        let mutation: FacetMutation = serde_json::from_str(r#"{ "type": "clearAll" }"#).unwrap();
        assert_eq!(mutation, FacetMutation::ClearAll);
    }
}
