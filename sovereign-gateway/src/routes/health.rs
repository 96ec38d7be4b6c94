//! Health endpoint, answered for any method

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

use super::json_response;
use crate::server::AppState;

pub fn handle_health(state: &AppState, origin: &str) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &state.pipeline.health(), origin)
}
