use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::error::SchedulerError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Scheduler(err) => match err {
                SchedulerError::AgentNotFound(_) => StatusCode::NOT_FOUND,
                SchedulerError::InvalidSchedule(_) => StatusCode::BAD_REQUEST,
                SchedulerError::CapabilityFailed { .. } => StatusCode::BAD_GATEWAY,
                SchedulerError::CapabilityTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                SchedulerError::UnknownCapability(_)
                | SchedulerError::RoutingInconsistency { .. }
                | SchedulerError::InvalidTransition { .. }
                | SchedulerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Request failed: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
