use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::api::error::ApiError;
use crate::api::server::AppState;
use crate::engine::Registry;
use crate::error::SchedulerError;
use crate::lifecycle::RunOutcome;
use crate::types::{AgentFilter, AgentId, AgentRecord, WebhookRequest, WebhookResponse};

#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub sources: Vec<AgentId>,
    pub interval_secs: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ListAgentsParams {
    pub kind: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
}

impl From<ListAgentsParams> for AgentFilter {
    fn from(params: ListAgentsParams) -> Self {
        Self {
            active_only: !params.include_inactive,
            kind: params.kind,
            name: params.name,
        }
    }
}

pub async fn health_check() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn list_agents(
    State(state): State<AppState>,
    Query(params): Query<ListAgentsParams>,
) -> Result<Json<Vec<AgentRecord>>, ApiError> {
    let agents = state.scheduler.registry().list(&params.into()).await?;
    Ok(Json(agents))
}

pub async fn register_agent(
    State(state): State<AppState>,
    Json(request): Json<RegisterAgentRequest>,
) -> Result<(StatusCode, Json<AgentRecord>), ApiError> {
    let registry = state.scheduler.registry();
    if request.name.trim().is_empty() {
        return Err(ApiError::BadRequest("agent name must not be empty".to_string()));
    }
    let interval = match request.interval_secs {
        Some(secs) => {
            let every = chrono::Duration::try_seconds(secs).ok_or_else(|| {
                ApiError::BadRequest(format!("interval_secs out of range: {}", secs))
            })?;
            Registry::validate_interval(every)?;
            Some(every)
        }
        None => None,
    };

    let mut sources = Vec::with_capacity(request.sources.len());
    for id in &request.sources {
        sources.push(registry.get(*id).await?);
    }

    let agent = registry
        .register(&request.name, &request.kind, request.config, Some(sources.as_slice()))
        .await
        .map_err(|err| match err {
            SchedulerError::UnknownCapability(kind) => {
                ApiError::BadRequest(format!("unknown capability: {}", kind))
            }
            other => other.into(),
        })?;

    let agent = match interval {
        Some(every) => {
            registry.schedule(agent.id, every).await?;
            registry.get(agent.id).await?
        }
        None => agent,
    };

    Ok((StatusCode::CREATED, Json(agent)))
}

pub async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<AgentId>,
) -> Result<Json<AgentRecord>, ApiError> {
    let agent = state.scheduler.registry().get(id).await?;
    Ok(Json(agent))
}

pub async fn deactivate_agent(
    State(state): State<AppState>,
    Path(id): Path<AgentId>,
) -> Result<Json<AgentRecord>, ApiError> {
    let registry = state.scheduler.registry();
    registry.deactivate(id).await?;
    Ok(Json(registry.get(id).await?))
}

pub async fn run_agent(
    State(state): State<AppState>,
    Path(id): Path<AgentId>,
) -> Result<Json<RunOutcome>, ApiError> {
    let agent = state.scheduler.registry().get(id).await?;
    let outcome = state.scheduler.lifecycle().run(&agent).await?;
    Ok(Json(outcome))
}

pub async fn agent_webhook(
    State(state): State<AppState>,
    Path(id): Path<AgentId>,
    method: Method,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let Some(agent) = state.scheduler.registry().find(id).await? else {
        return Ok(into_http(WebhookResponse::not_found()));
    };

    let request = WebhookRequest {
        method: method.to_string(),
        headers: headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect(),
        query,
        body: parse_body(&body),
    };

    let response = state
        .scheduler
        .lifecycle()
        .receive_webhook(&agent, request)
        .await?;
    Ok(into_http(response))
}

/// JSON bodies are passed through as JSON, anything else as a string.
fn parse_body(body: &Bytes) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

fn into_http(response: WebhookResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or_else(|_| {
        log::warn!("Capability returned invalid status {}", response.status);
        StatusCode::INTERNAL_SERVER_ERROR
    });
    (status, Json(response.body)).into_response()
}
