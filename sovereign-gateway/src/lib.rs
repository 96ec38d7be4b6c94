//! Sovereign Gateway - HTTP front door for the decision pipeline
//!
//! Exposes the pipeline to browsers and CLI callers behind an origin
//! allowlist and an optional shared access code.
//!
//! ## Routes
//!
//! - `GET|POST /omega/health` - node identity and model
//! - `POST /omega/chat` - one decision, enforced and recorded
//! - `POST /omega/dataset` - trade-dependency rows, synthetic on failure
//! - `POST /omega/mission` - store and optionally activate a mission packet
//! - `GET /omega/mission?country=` - the active mission
//! - `GET /omega/audit?country=` - the audit chain and its validation
//!
//! `OPTIONS` on any path answers the CORS preflight.

pub mod access;
pub mod config;
pub mod error;
pub mod routes;
pub mod server;

pub use access::{AccessPolicy, OriginDecision, ACCESS_CODE_HEADER};
pub use config::Args;
pub use error::{GatewayError, Result};
pub use server::{run, serve, AppState};
