use crate::api::{ApiResponse, state::AppState};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use portalflow_core::{OrchestratorError, Portal, StepResponse, TaskRequest, TaskType};
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub task_type: TaskType,
    pub portal: Portal,
    pub description: &'static str,
    pub steps: Vec<&'static str>,
}

#[derive(Serialize)]
pub struct AutomationStatus {
    pub service: &'static str,
    pub tasks: Vec<TaskInfo>,
}

pub async fn status(State(state): State<AppState>) -> Json<ApiResponse<AutomationStatus>> {
    let protocols = state.orchestrator.protocols();
    let tasks = protocols
        .tasks()
        .into_iter()
        .map(|task| TaskInfo {
            task_type: task,
            portal: task.portal(),
            description: task.description(),
            steps: protocols.get(task).steps.iter().map(|step| step.tag).collect(),
        })
        .collect();

    Json(ApiResponse::ok(AutomationStatus {
        service: "PortalFlow",
        tasks,
    }))
}

/// `POST /api/automation/execute`, task named in the body.
pub async fn execute(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<StepResponse>) {
    dispatch(&state, None, body).await
}

/// `POST /api/automation/{task_type}`
pub async fn run_task(
    State(state): State<AppState>,
    Path(task_type): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<StepResponse>) {
    match task_type.parse::<TaskType>() {
        Ok(task) => dispatch(&state, Some(task), body).await,
        Err(err) => respond(StepResponse::from(err)),
    }
}

pub async fn abandon_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> (StatusCode, Json<ApiResponse<()>>) {
    if state.orchestrator.abandon(&session_id).await {
        (
            StatusCode::OK,
            Json(ApiResponse::message(format!("Session {} closed", session_id))),
        )
    } else {
        let err = OrchestratorError::SessionExpiredOrNotFound(session_id);
        (StatusCode::NOT_FOUND, Json(ApiResponse::error(err.to_string())))
    }
}

async fn dispatch(
    state: &AppState,
    route_task: Option<TaskType>,
    body: Value,
) -> (StatusCode, Json<StepResponse>) {
    let response = match TaskRequest::from_json(route_task, body) {
        Ok(request) => state.orchestrator.execute(request).await,
        Err(err) => StepResponse::from(err),
    };
    respond(response)
}

fn respond(response: StepResponse) -> (StatusCode, Json<StepResponse>) {
    let status =
        StatusCode::from_u16(response.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response))
}
