//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Every request passes
//! the origin check and the access-code gate before it is routed.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use sovereign_agent::{DecisionPipeline, OpenAiBackend, PipelineConfig};
use sovereign_ledger::{KvBackend, LedgerStore, MemoryKv, SqliteKv};

use crate::access::{AccessPolicy, OriginDecision, ACCESS_CODE_HEADER};
use crate::config::Args;
use crate::error::{GatewayError, Result};
use crate::routes::{self, RouteRequest};

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Shared application state
pub struct AppState {
    pub pipeline: DecisionPipeline,
    pub access: AccessPolicy,
}

impl AppState {
    pub fn new(pipeline: DecisionPipeline, access: AccessPolicy) -> Self {
        Self { pipeline, access }
    }

    /// Wire the ledger, inference backend and access policy from CLI args.
    pub fn from_args(args: &Args) -> Result<Self> {
        args.validate().map_err(GatewayError::Config)?;

        let config = match &args.pipeline_config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };

        let kv: Arc<dyn KvBackend> = match &args.ledger_path {
            Some(path) => Arc::new(SqliteKv::open(path)?),
            None => Arc::new(MemoryKv::new()),
        };
        info!("Ledger backend: {}", kv.id());

        let backend = OpenAiBackend::new(
            args.inference_base_url.clone(),
            args.model.clone(),
            args.inference_api_key.clone(),
        )?;
        let pipeline = DecisionPipeline::new(Arc::new(backend), LedgerStore::new(kv), config);
        let access = AccessPolicy::new(
            args.allowed_origin_list(),
            args.access_code().map(str::to_string),
        );

        Ok(Self::new(pipeline, access))
    }
}

/// Bind `listen` and serve until the process exits.
pub async fn run(listen: SocketAddr, state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(listen).await?;

    let health = state.pipeline.health();
    info!(
        "Sovereign gateway listening on {} as node {} (model {})",
        listen, health.node, health.model
    );
    if state.access.requires_code() {
        info!("Access code required on every request");
    }

    serve(listener, state).await
}

/// Accept loop over an already-bound listener.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Accept error: {}", e);
            }
        }
    }
}

/// Handle incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    debug!("{} {} from {}", method, path, addr);

    let origin_header = header_str(&req, hyper::header::ORIGIN.as_str());

    // Preflight echoes the caller's origin before any allowlist check
    if method == Method::OPTIONS {
        let origin = origin_header.as_deref().filter(|o| !o.is_empty()).unwrap_or("*");
        return Ok(to_boxed(routes::preflight_response(origin)));
    }

    let origin = match state.access.pick_origin(origin_header.as_deref()) {
        OriginDecision::Allow(origin) => origin,
        OriginDecision::Forbidden => {
            warn!(origin = ?origin_header, "Rejected request from forbidden origin");
            return Ok(to_boxed(routes::text_response(
                StatusCode::FORBIDDEN,
                "Forbidden origin",
                None,
            )));
        }
    };

    let code = header_str(&req, ACCESS_CODE_HEADER);
    if !state.access.authorize(code.as_deref()) {
        warn!("Rejected {} {} from {}: missing or wrong access code", method, path, addr);
        return Ok(to_boxed(routes::text_response(
            StatusCode::UNAUTHORIZED,
            "Unauthorized",
            Some(&origin),
        )));
    }

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Failed to read request body from {}: {}", addr, e);
            Bytes::new()
        }
    };

    let request = RouteRequest {
        method,
        path,
        query,
        body,
    };
    Ok(to_boxed(routes::dispatch(&state, request, &origin).await))
}

fn header_str(req: &Request<Incoming>, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}
