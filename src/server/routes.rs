use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::requests::InferenceRequest;
use super::responses::InferenceResponder;
use crate::scheduler::{Orchestrator, SchedulerStatus};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// How long a handler waits for its request to complete
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, request_timeout: Duration) -> Self {
        Self {
            orchestrator,
            request_timeout,
        }
    }
}

/// Submit an inference request and wait for the result.
async fn inference_handler(
    State(state): State<AppState>,
    payload: Result<Json<InferenceRequest>, JsonRejection>,
) -> InferenceResponder {
    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => {
            warn!("⚠️ HANDLER: Rejected inference request - {}", rejection.body_text());
            return InferenceResponder::validation_error(rejection.body_text());
        }
    };

    info!(
        "📨 HANDLER: Received inference request - model={}, priority={}, request_id={:?}",
        request.model_id, request.priority, request.request_id
    );

    match state
        .orchestrator
        .submit_with_timeout(request, state.request_timeout)
        .await
    {
        Ok(response) => {
            info!(
                "✅ HANDLER: Inference completed - request_id={}, slot={}, time_ms={:.1}",
                response.request_id, response.slot_id, response.execution_time_ms
            );
            InferenceResponder::completion(response)
        }
        Err(e) => e.into(),
    }
}

/// Current queue depth and slot occupancy.
async fn status_handler(State(state): State<AppState>) -> Json<SchedulerStatus> {
    Json(state.orchestrator.status())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/inference", post(inference_handler))
        .route("/api/v1/status", get(status_handler))
        .with_state(state)
}
