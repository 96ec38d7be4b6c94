//! Mission packet routes
//!
//! - POST /omega/mission - validate, store and optionally activate a packet
//! - GET /omega/mission?country= - the jurisdiction's active mission

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde_json::json;
use tracing::{error, warn};

use sovereign_agent::{MissionRequest, PipelineError};

use super::{json_response, RouteRequest};
use crate::server::AppState;

pub async fn handle_set_mission(state: &AppState, request: &RouteRequest, origin: &str) -> Response<Full<Bytes>> {
    let mission = MissionRequest::from_value(request.json_body());
    match state.pipeline.set_mission(mission).await {
        Ok(response) => json_response(StatusCode::OK, &response, origin),
        Err(PipelineError::Storage(e)) => {
            error!("Failed to store mission: {}", e);
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &json!({"ok": false, "error": "Storage error"}),
                origin,
            )
        }
        Err(e) => {
            warn!("Rejected mission packet: {}", e);
            json_response(
                StatusCode::BAD_REQUEST,
                &json!({"ok": false, "error": "Invalid mission packet"}),
                origin,
            )
        }
    }
}

pub async fn handle_get_mission(state: &AppState, request: &RouteRequest, origin: &str) -> Response<Full<Bytes>> {
    let country = request.query_param("country");
    let view = state.pipeline.get_mission(country.as_deref()).await;
    json_response(StatusCode::OK, &view, origin)
}
