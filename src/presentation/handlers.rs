// HTTP request handlers
use crate::application::explorer_service::ExplorerError;
use crate::domain::entity::Entity;
use crate::domain::filter::{FacetMutation, FilterState};
use crate::domain::metrics::{EntityKey, EntityKind};
use crate::infrastructure::time_range::TimeRange;
use crate::presentation::app_state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesRequest {
    pub query: String,
    #[serde(default)]
    pub range: TimeRange,
    pub label_field: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsRequest {
    pub entities: Vec<EntityKey>,
    #[serde(default)]
    pub range: TimeRange,
    #[serde(default)]
    pub vars: HashMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRequest {
    pub entities: Vec<Entity>,
    pub entity_kind: Option<EntityKind>,
    #[serde(default)]
    pub state: FilterState,
    pub mutation: Option<FacetMutation>,
}

impl IntoResponse for ExplorerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ExplorerError::TimeRange(_) | ExplorerError::Filter(_) => StatusCode::BAD_REQUEST,
            ExplorerError::Backend(_) | ExplorerError::Aggregation(_) => StatusCode::BAD_GATEWAY,
            ExplorerError::Superseded => StatusCode::CONFLICT,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

fn parse_kind(kind: &str) -> Result<EntityKind, Response> {
    kind.parse::<EntityKind>()
        .map_err(|e| (StatusCode::NOT_FOUND, Json(json!({ "error": e }))).into_response())
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Run a chart query and return normalized series
pub async fn query_series(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SeriesRequest>,
) -> Response {
    match state
        .explorer_service
        .series(&request.query, &request.range, request.label_field.as_deref())
        .await
    {
        Ok(series) => Json(series).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Aggregate all metric kinds for a set of entities
pub async fn load_metrics(
    Path(kind): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<MetricsRequest>,
) -> Response {
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(response) => return response,
    };

    match state
        .explorer_service
        .load_metrics(kind, &request.entities, &request.range, &request.vars)
        .await
    {
        Ok(records) => Json(records).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Latest aggregation state for an entity kind
pub async fn metrics_snapshot(
    Path(kind): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    match parse_kind(&kind) {
        Ok(kind) => Json(state.explorer_service.metrics_snapshot(kind)).into_response(),
        Err(response) => response,
    }
}

/// Apply a facet mutation and re-run the filter pipeline
pub async fn filter_entities(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FilterRequest>,
) -> Response {
    match state.explorer_service.filter(
        request.entities,
        request.entity_kind,
        request.state,
        request.mutation,
    ) {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        let superseded = ExplorerError::Superseded.into_response();
        assert_eq!(superseded.status(), StatusCode::CONFLICT);

        let backend = ExplorerError::Backend("timeout".to_string()).into_response();
        assert_eq!(backend.status(), StatusCode::BAD_GATEWAY);

        assert_eq!(parse_kind("services").unwrap_err().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_filter_request_defaults() {
        let request: FilterRequest = serde_json::from_str(
            r#"{ "entities": [{ "key": "cart:Add", "name": "cart" }], "entityKind": "dependency" }"#,
        )
        .unwrap();

        assert_eq!(request.entities[0].key, EntityKey::from("cart:Add"));
        assert_eq!(request.entity_kind, Some(EntityKind::Dependency));
        assert_eq!(request.state, FilterState::default());
        assert!(request.mutation.is_none());
    }
}
