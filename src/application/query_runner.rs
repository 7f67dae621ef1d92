// Query execution collaborator trait
use crate::domain::response::RawResponse;
use async_trait::async_trait;
use serde::Serialize;

/// A fully prepared backend query over a concrete time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query: String,
    pub start_time_epoch_seconds: i64,
    pub end_time_epoch_seconds: i64,
}

#[async_trait]
pub trait QueryRunner: Send + Sync {
    /// Execute one query. Connection pooling, timeouts and retries are the
    /// implementation's business; callers only see the outcome.
    async fn execute(&self, request: &QueryRequest) -> anyhow::Result<RawResponse>;
}
