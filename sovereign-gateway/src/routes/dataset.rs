//! POST /omega/dataset - generate and cache a trade-dependency dataset

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

use sovereign_agent::DatasetRequest;

use super::{json_response, RouteRequest};
use crate::server::AppState;

pub async fn handle_dataset(state: &AppState, request: &RouteRequest, origin: &str) -> Response<Full<Bytes>> {
    let dataset = DatasetRequest::from_value(&request.json_body());
    let response = state.pipeline.fetch_dataset(dataset).await;
    json_response(StatusCode::OK, &response, origin)
}
