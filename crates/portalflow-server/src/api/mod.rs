pub mod automation;
pub mod brain;
pub mod response;
pub mod state;


pub use response::ApiResponse;
pub use state::{AppState, ServerCore};

use axum::{
    Json, Router,
    http::{Method, header},
    routing::{delete, get, post},
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

#[derive(Serialize)]
struct Health {
    status: String,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "portalflow is working!".to_string(),
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/automation/status", get(automation::status))
        .route("/api/automation/execute", post(automation::execute))
        .route("/api/automation/{task_type}", post(automation::run_task))
        .route(
            "/api/automation/sessions/{id}",
            delete(automation::abandon_session),
        )
        .route("/api/brain/process", post(brain::process))
        .with_state(state)
}

/// Any origin, limited to the methods and headers the routes above use.
pub fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
