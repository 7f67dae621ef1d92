// HTTP query runner - executes queries against the metrics backend
use crate::application::query_runner::{QueryRequest, QueryRunner};
use crate::domain::response::RawResponse;
use crate::infrastructure::config::BackendSettings;
use anyhow::{Context, Result};
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct HttpQueryRunner {
    client: reqwest::Client,
    host: String,
    query_path: String,
    step_seconds: u64,
    token: Option<String>,
}

impl HttpQueryRunner {
    pub fn new(settings: &BackendSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: settings.host.trim_end_matches('/').to_string(),
            query_path: settings.query_path.clone(),
            step_seconds: settings.step_seconds,
            token: settings.token.clone().filter(|t| !t.is_empty()),
        }
    }

    fn build_query_url(&self, request: &QueryRequest) -> String {
        format!(
            "{}{}?query={}&start={}&end={}&step={}",
            self.host,
            self.query_path,
            urlencoding::encode(&request.query),
            request.start_time_epoch_seconds,
            request.end_time_epoch_seconds,
            self.step_seconds
        )
    }
}

/// Surface an error envelope (`{"status": "error", "error": ...}`) as a failure.
fn check_envelope(body: &serde_json::Value) -> Result<()> {
    if body.get("status").and_then(|s| s.as_str()) == Some("error") {
        let message = body
            .get("error")
            .and_then(|e| e.as_str())
            .unwrap_or("unknown error");
        anyhow::bail!("Backend query error: {}", message);
    }
    Ok(())
}

#[async_trait]
impl QueryRunner for HttpQueryRunner {
    async fn execute(&self, request: &QueryRequest) -> Result<RawResponse> {
        let url = self.build_query_url(request);
        tracing::debug!("Executing backend query: {}", request.query);

        let mut builder = self
            .client
            .get(&url)
            .header("Accept", "application/json");
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .context("Failed to send request to metrics backend")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Backend query failed with status {}: {}", status, body);
        }

        let body = response
            .json::<serde_json::Value>()
            .await
            .context("Failed to parse backend response")?;
        check_envelope(&body)?;

        Ok(RawResponse::from(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_query_url() {
        let runner = HttpQueryRunner::new(&BackendSettings {
            host: "http://prometheus:9090/".to_string(),
            query_path: "/api/v1/query_range".to_string(),
            step_seconds: 30,
            token: Some(String::new()),
        });
        let url = runner.build_query_url(&QueryRequest {
            query: "sum(rate(x[5m]))".to_string(),
            start_time_epoch_seconds: 10,
            end_time_epoch_seconds: 20,
        });

        assert_eq!(
            url,
            "http://prometheus:9090/api/v1/query_range?query=sum%28rate%28x%5B5m%5D%29%29&start=10&end=20&step=30"
        );
        assert!(runner.token.is_none());
    }

    #[test]
    fn test_check_envelope() {
        assert!(check_envelope(&json!({ "status": "success", "data": {} })).is_ok());
        assert!(check_envelope(&json!([])).is_ok());

        let err = check_envelope(&json!({ "status": "error", "error": "bad query" })).unwrap_err();
        assert_eq!(err.to_string(), "Backend query error: bad query");
    }
}
