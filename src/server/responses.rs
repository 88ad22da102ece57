//! Response types and HTTP error mapping for the inference API.

use axum::extract::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::scheduler::SchedulerError;

/// Response from inference execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InferenceResponse {
    /// Request identifier, generated when the caller did not supply one
    pub request_id: String,
    /// Model used
    pub model_id: String,
    /// Generated output
    pub output: String,
    /// GPU slot that processed the request
    pub slot_id: usize,
    /// Time spent executing while holding the slot, in milliseconds
    pub execution_time_ms: f64,
}

/// JSON error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonError {
    pub message: String,
}

impl JsonError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn to_response(&self, code: StatusCode) -> axum::response::Response {
        let mut r = Json(self).into_response();
        *r.status_mut() = code;
        r
    }
}

/// HTTP response for the inference endpoint.
///
/// Queue-full and timeout stay distinct all the way out: one is a 503 the
/// client should back off from, the other a 504.
#[derive(Debug)]
pub enum InferenceResponder {
    /// Successful completion
    Completion(InferenceResponse),
    /// Admission refused, queue at capacity
    QueueFull(String),
    /// Caller-side wait budget exceeded
    Timeout(String),
    /// Execution failed or the request was abandoned
    ModelError(String),
    /// Request validation error
    ValidationError(String),
}

impl InferenceResponder {
    pub fn completion(response: InferenceResponse) -> Self {
        Self::Completion(response)
    }

    pub fn validation_error(error: impl Into<String>) -> Self {
        Self::ValidationError(error.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Completion(_) => StatusCode::OK,
            Self::QueueFull(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::ModelError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl From<SchedulerError> for InferenceResponder {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::QueueFull { .. } => {
                Self::QueueFull("Queue is full. Please try again later.".to_string())
            }
            SchedulerError::Timeout(_) => Self::Timeout(
                "Request timeout. The server took too long to respond.".to_string(),
            ),
            err @ (SchedulerError::Execution(_) | SchedulerError::Abandoned) => {
                warn!(error = %err, "inference request failed");
                Self::ModelError(err.to_string())
            }
        }
    }
}

impl IntoResponse for InferenceResponder {
    fn into_response(self) -> axum::response::Response {
        let code = self.status_code();
        match self {
            Self::Completion(response) => Json(response).into_response(),
            Self::QueueFull(msg)
            | Self::Timeout(msg)
            | Self::ModelError(msg)
            | Self::ValidationError(msg) => JsonError::new(msg).to_response(code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ExecutionError;
    use std::time::Duration;

    #[test]
    fn test_json_error() {
        let error = JsonError::new("test error");
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("test error"));
    }

    #[test]
    fn test_scheduler_errors_map_to_distinct_statuses() {
        let full: InferenceResponder = SchedulerError::QueueFull { max_size: 2 }.into();
        let timeout: InferenceResponder = SchedulerError::Timeout(Duration::from_secs(1)).into();
        let failed: InferenceResponder =
            SchedulerError::Execution(ExecutionError::new("boom")).into();
        let abandoned: InferenceResponder = SchedulerError::Abandoned.into();

        assert_eq!(full.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(failed.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(abandoned.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_egress_field_names() {
        let response = InferenceResponse {
            request_id: "req-1".to_string(),
            model_id: "m".to_string(),
            output: "out".to_string(),
            slot_id: 3,
            execution_time_ms: 12.5,
        };
        let value = serde_json::to_value(&response).unwrap();
        for field in ["request_id", "model_id", "output", "slot_id", "execution_time_ms"] {
            assert!(value.get(field).is_some(), "missing field {field}");
        }
    }

    #[test]
    fn test_responder_sets_status() {
        let response = InferenceResponder::validation_error("bad body").into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
