//! Sovereign Gateway - HTTP front door for the decision pipeline

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sovereign_gateway::{config::Args, server, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    let (json_layer, text_layer) = if args.log_json {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "sovereign_gateway={lvl},sovereign_agent={lvl},sovereign_ledger={lvl},info",
                    lvl = log_level
                )
                .into()
            }),
        )
        .with(json_layer)
        .with(text_layer)
        .init();

    let state = match AppState::from_args(&args) {
        Ok(state) => state,
        Err(e) => {
            error!("Startup failed: {}", e);
            std::process::exit(1);
        }
    };

    let config = state.pipeline.config();
    let origins = args.allowed_origin_list();
    info!("======================================");
    info!("  Sovereign Gateway");
    info!("======================================");
    info!("Node: {}", config.node_id);
    info!("Listen: {}", args.listen);
    info!("Model: {}", args.model);
    info!("Inference: {}", args.inference_base_url);
    info!("Default jurisdiction: {}", config.defaults.jurisdiction);
    if origins.is_empty() {
        info!("Origins: any");
    } else {
        info!("Origins: {}", origins.join(", "));
    }
    info!("======================================");

    server::run(args.listen, Arc::new(state)).await?;

    Ok(())
}
