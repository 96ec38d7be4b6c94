//! HTTP routes for the gateway

pub mod audit;
pub mod chat;
pub mod dataset;
pub mod health;
pub mod mission;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Method, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;

use crate::access::apply_cors;
use crate::server::AppState;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// A request reduced to what the routes need.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub body: Bytes,
}

impl RouteRequest {
    /// Body parsed as JSON, `Null` when empty or malformed.
    pub fn json_body(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }

    /// First value of a query parameter, ignoring empty values.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
    }
}

/// Route an authorized request.
pub async fn dispatch(state: &AppState, request: RouteRequest, origin: &str) -> Response<Full<Bytes>> {
    match (request.method.clone(), request.path.as_str()) {
        (_, "/omega/health") => health::handle_health(state, origin),
        (Method::POST, "/omega/chat") => chat::handle_chat(state, &request, origin).await,
        (Method::POST, "/omega/dataset") => dataset::handle_dataset(state, &request, origin).await,
        (Method::POST, "/omega/mission") => mission::handle_set_mission(state, &request, origin).await,
        (Method::GET, "/omega/mission") => mission::handle_get_mission(state, &request, origin).await,
        (Method::GET, "/omega/audit") => audit::handle_audit(state, &request, origin).await,
        _ => text_response(StatusCode::NOT_FOUND, "Not Found", Some(origin)),
    }
}

/// JSON response with CORS headers.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T, origin: &str) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(json) => {
            let mut response = Response::new(Full::new(Bytes::from(json)));
            *response.status_mut() = status;
            let headers = response.headers_mut();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
            apply_cors(headers, origin);
            response
        }
        Err(_) => text_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to serialize response",
            Some(origin),
        ),
    }
}

/// Plain-text response, with CORS headers when an origin was accepted.
pub fn text_response(status: StatusCode, text: &'static str, origin: Option<&str>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(text.as_bytes())));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_CONTENT_TYPE));
    if let Some(origin) = origin {
        apply_cors(headers, origin);
    }
    response
}

/// Empty CORS preflight response.
pub fn preflight_response(origin: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    apply_cors(response.headers_mut(), origin);
    response
}
