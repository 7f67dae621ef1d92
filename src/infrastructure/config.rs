use crate::domain::filter::FilterSettings;
use crate::domain::metrics::{EntityKind, MetricKind};
use serde::Deserialize;
use std::collections::HashMap;

const ENV_PREFIX: &str = "EXPLORER";

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub backend: BackendSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendSettings {
    pub host: String,
    #[serde(default = "default_query_path")]
    pub query_path: String,
    #[serde(default = "default_step_seconds")]
    pub step_seconds: u64,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

fn default_query_path() -> String {
    "/api/v1/query_range".to_string()
}

fn default_step_seconds() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    pub queries: QueryTemplates,
    #[serde(default)]
    pub filter: FilterSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryTemplates {
    pub operation: MetricQueries,
    pub dependency: MetricQueries,
}

impl QueryTemplates {
    pub fn for_kind(&self, kind: EntityKind) -> &MetricQueries {
        match kind {
            EntityKind::Operation => &self.operation,
            EntityKind::Dependency => &self.dependency,
        }
    }
}

/// One query per metric kind, either as `${var}` templates or prepared text.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct MetricQueries {
    pub p50_latency: String,
    pub p90_latency: String,
    pub p99_latency: String,
    pub fault_rate: String,
    pub error_rate: String,
    pub availability: String,
    pub request_count: String,
}

impl MetricQueries {
    pub fn get(&self, kind: MetricKind) -> &str {
        match kind {
            MetricKind::P50Latency => &self.p50_latency,
            MetricKind::P90Latency => &self.p90_latency,
            MetricKind::P99Latency => &self.p99_latency,
            MetricKind::FaultRate => &self.fault_rate,
            MetricKind::ErrorRate => &self.error_rate,
            MetricKind::Availability => &self.availability,
            MetricKind::RequestCount => &self.request_count,
        }
    }

    /// Substitute `vars` into every template.
    pub fn prepared(&self, vars: &HashMap<String, String>) -> MetricQueries {
        MetricQueries {
            p50_latency: prepare_query(&self.p50_latency, vars),
            p90_latency: prepare_query(&self.p90_latency, vars),
            p99_latency: prepare_query(&self.p99_latency, vars),
            fault_rate: prepare_query(&self.fault_rate, vars),
            error_rate: prepare_query(&self.error_rate, vars),
            availability: prepare_query(&self.availability, vars),
            request_count: prepare_query(&self.request_count, vars),
        }
    }
}

fn load<T: serde::de::DeserializeOwned>(name: &str) -> anyhow::Result<T> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(name))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

pub fn load_backend_config() -> anyhow::Result<BackendConfig> {
    load("config/backend")
}

pub fn load_metrics_config() -> anyhow::Result<MetricsConfig> {
    load("config/metrics")
}

/// Replace template variables in a query string
pub fn prepare_query(query: &str, vars: &HashMap<String, String>) -> String {
    let mut result = query.to_string();
    for (key, value) in vars {
        let placeholder = format!("${{{}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::filter::Thresholds;

    const METRICS_TOML: &str = r#"
        [queries.operation]
        p50_latency = "latency{service='${service}', q='0.5'}"
        p90_latency = "latency{service='${service}', q='0.9'}"
        p99_latency = "latency{service='${service}', q='0.99'}"
        fault_rate = "faults{service='${service}'}"
        error_rate = "errors{service='${service}'}"
        availability = "availability{service='${service}'}"
        request_count = "requests{service='${service}'}"

        [queries.dependency]
        p50_latency = "a"
        p90_latency = "b"
        p99_latency = "c"
        fault_rate = "d"
        error_rate = "e"
        availability = "f"
        request_count = "g"

        [filter]
        health_metric = "faultRate"
        availability = { low = 95.0, high = 99.0 }
    "#;

    #[test]
    fn test_prepare_query() {
        let mut vars = HashMap::new();
        vars.insert("service".to_string(), "checkout".to_string());
        vars.insert("environment".to_string(), "prod".to_string());

        let query = "latency{service='${service}', env='${environment}'}";
        let result = prepare_query(query, &vars);

        assert_eq!(result, "latency{service='checkout', env='prod'}");
    }

    #[test]
    fn test_metrics_config_deserializes() {
        let config: MetricsConfig = config::Config::builder()
            .add_source(config::File::from_str(METRICS_TOML, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.queries.for_kind(EntityKind::Dependency).get(MetricKind::RequestCount), "g");
        assert_eq!(config.filter.health_metric, MetricKind::FaultRate);
        assert_eq!(config.filter.availability, Thresholds::new(95.0, 99.0));
        // Unset filter keys keep their defaults
        assert_eq!(config.filter.fault_rate, FilterSettings::default().fault_rate);

        let mut vars = HashMap::new();
        vars.insert("service".to_string(), "cart".to_string());
        let prepared = config.queries.operation.prepared(&vars);
        assert_eq!(prepared.get(MetricKind::FaultRate), "faults{service='cart'}");
    }
}
