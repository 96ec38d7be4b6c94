//! GET /omega/audit?country= - hash-chained audit trail with its validation

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

use super::{json_response, RouteRequest};
use crate::server::AppState;

pub async fn handle_audit(state: &AppState, request: &RouteRequest, origin: &str) -> Response<Full<Bytes>> {
    let country = request.query_param("country");
    let trail = state.pipeline.audit_trail(country.as_deref()).await;
    json_response(StatusCode::OK, &trail, origin)
}
