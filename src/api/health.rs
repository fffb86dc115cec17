use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and a config summary; secrets are never echoed.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "responses-gateway is running",
        "config": {
            "backend": {
                "endpoint": state.transport.responses_url().as_str(),
                "deployment": config.backend.deployment,
            },
            "client_keys_count": config.client_authentication.allowed_keys.len(),
            "features": {
                "log_level": config.features.log_level,
            }
        }
    }))
}
