use crate::api::state::AppState;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use portalflow_core::Intent;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

#[derive(Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub text: Option<String>,
}

/// `POST /api/brain/process`
pub async fn process(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> Response {
    let Some(text) = request
        .text
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"msg": "No text provided"})),
        )
            .into_response();
    };

    match state.classifier.classify(&text).await {
        Ok(intent) => {
            info!(task = %intent.task, "Intent classified");
            Json::<Intent>(intent).into_response()
        }
        Err(err) => {
            error!(error = %err, "Intent classification failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "task": "unknown",
                    "reply": "Sorry, my AI brain had an error. Please try again."
                })),
            )
                .into_response()
        }
    }
}
