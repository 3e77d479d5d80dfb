use crate::state::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ModelsResponse {
    models: Vec<String>,
}

// The advertised set only fills the page's picker; the chat endpoint takes
// whatever model name the client sends.
async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.models,
    })
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/models", get(list_models))
        .with_state(state)
}
