use bytes::Bytes;
use serde_json::Value;

use crate::protocol::openai_responses::ReasoningEffort;

const MODEL_CREATED: u64 = 1_677_610_602;

/// Prebuilt `/v1/models` body: one entry per reasoning-effort alias, all
/// served by the configured deployment.
pub(crate) fn build_models_response_body(deployment: &str) -> Bytes {
    let models: Vec<Value> = ReasoningEffort::ALL
        .into_iter()
        .map(|effort| {
            let id = effort.model_alias();
            serde_json::json!({
                "id": id,
                "object": "model",
                "created": MODEL_CREATED,
                "owned_by": deployment,
            })
        })
        .collect();

    let payload = serde_json::json!({
        "object": "list",
        "data": models,
    });
    serde_json::to_vec(&payload).map_or_else(
        |_| Bytes::from_static(br#"{"object":"list","data":[]}"#),
        Bytes::from,
    )
}
