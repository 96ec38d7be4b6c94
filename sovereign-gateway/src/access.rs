//! Access control: origin allowlist, CORS headers and the shared-secret gate.
//!
//! Header-less callers (CLI, server-to-server) are allowed by origin and
//! rely on the access code; browser callers must be allowlisted when an
//! allowlist is configured.

use hyper::header::{HeaderMap, HeaderName, HeaderValue};

/// Header carrying the shared secret.
pub const ACCESS_CODE_HEADER: &str = "x-omega-code";

const ALLOW_METHODS: &str = "POST,OPTIONS,GET";
const ALLOW_HEADERS: &str = "Content-Type,X-OMEGA-CODE";
const MAX_AGE: &str = "86400";

/// Result of checking a request's origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginDecision {
    /// Value for `Access-Control-Allow-Origin`
    Allow(String),
    Forbidden,
}

/// Origin and access-code policy.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    allowed_origins: Vec<String>,
    access_code: Option<String>,
}

impl AccessPolicy {
    pub fn new(allowed_origins: Vec<String>, access_code: Option<String>) -> Self {
        Self {
            allowed_origins,
            access_code: access_code.filter(|c| !c.is_empty()),
        }
    }

    /// Decide the CORS origin for a request.
    pub fn pick_origin(&self, origin: Option<&str>) -> OriginDecision {
        match origin.filter(|o| !o.is_empty()) {
            None => OriginDecision::Allow("*".to_string()),
            Some(origin) if self.allowed_origins.is_empty() => OriginDecision::Allow(origin.to_string()),
            Some(origin) if self.allowed_origins.iter().any(|a| a == origin) => {
                OriginDecision::Allow(origin.to_string())
            }
            Some(_) => OriginDecision::Forbidden,
        }
    }

    /// Whether the request carries the configured access code.
    ///
    /// Always true when no code is configured.
    pub fn authorize(&self, provided: Option<&str>) -> bool {
        match &self.access_code {
            None => true,
            Some(code) => provided == Some(code.as_str()),
        }
    }

    pub fn requires_code(&self) -> bool {
        self.access_code.is_some()
    }
}

/// Append the CORS headers for `origin`.
pub fn apply_cors(headers: &mut HeaderMap, origin: &str) {
    let origin = HeaderValue::from_str(origin).unwrap_or_else(|_| HeaderValue::from_static("*"));
    headers.insert(HeaderName::from_static("access-control-allow-origin"), origin);
    headers.insert(
        HeaderName::from_static("access-control-allow-methods"),
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-headers"),
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    headers.insert(
        HeaderName::from_static("access-control-max-age"),
        HeaderValue::from_static(MAX_AGE),
    );
}
