//! POST /omega/chat - run one decision through the pipeline

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use tracing::debug;

use sovereign_agent::ChatRequest;

use super::{json_response, text_response, RouteRequest};
use crate::server::AppState;

pub async fn handle_chat(state: &AppState, request: &RouteRequest, origin: &str) -> Response<Full<Bytes>> {
    let chat = match ChatRequest::from_value(&request.json_body()) {
        Ok(chat) => chat,
        Err(e) => {
            debug!("Rejected chat request: {}", e);
            return text_response(StatusCode::BAD_REQUEST, "Bad Request", Some(origin));
        }
    };

    // Model failures still answer 200 with a vetoed stub
    let response = state.pipeline.chat(chat).await;
    json_response(StatusCode::OK, &response, origin)
}
