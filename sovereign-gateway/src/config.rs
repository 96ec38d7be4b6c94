//! Configuration for the gateway
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Sovereign Gateway - HTTP front door for the decision pipeline
#[derive(Parser, Debug, Clone)]
#[command(name = "sovereign-gateway")]
#[command(about = "HTTP gateway for the sovereign decision pipeline")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8787")]
    pub listen: SocketAddr,

    /// Model identifier sent to the inference service
    #[arg(long, env = "OMEGA_MODEL", default_value = "@cf/meta/llama-3.1-8b-instruct")]
    pub model: String,

    /// OpenAI-compatible inference endpoint
    #[arg(long, env = "INFERENCE_BASE_URL", default_value = "http://localhost:11434/v1")]
    pub inference_base_url: String,

    /// Bearer token for the inference endpoint (optional)
    #[arg(long, env = "INFERENCE_API_KEY")]
    pub inference_api_key: Option<String>,

    /// Comma-separated browser origins allowed to call the gateway
    /// Empty means any origin is echoed back
    #[arg(long, env = "ALLOWED_ORIGINS")]
    pub allowed_origins: Option<String>,

    /// Shared secret required in the X-OMEGA-CODE header (optional)
    #[arg(long, env = "OMEGA_ACCESS_CODE")]
    pub access_code: Option<String>,

    /// SQLite ledger file; in-memory when unset
    #[arg(long, env = "LEDGER_PATH")]
    pub ledger_path: Option<PathBuf>,

    /// YAML pipeline configuration file (optional)
    #[arg(long, env = "PIPELINE_CONFIG")]
    pub pipeline_config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,
}

impl Args {
    /// Parsed origin allowlist
    pub fn allowed_origin_list(&self) -> Vec<String> {
        self.allowed_origins
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Access code, treating an empty value as unset
    pub fn access_code(&self) -> Option<&str> {
        self.access_code.as_deref().filter(|c| !c.is_empty())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("OMEGA_MODEL must not be empty".to_string());
        }

        let base = url::Url::parse(&self.inference_base_url)
            .map_err(|e| format!("INFERENCE_BASE_URL is not a valid URL: {}", e))?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err("INFERENCE_BASE_URL must use http or https".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["sovereign-gateway"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_origin_list() {
        let args = parse(&["--allowed-origins", " https://a.example , ,https://b.example"]);
        assert_eq!(
            args.allowed_origin_list(),
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn test_validate() {
        assert!(parse(&[]).validate().is_ok());
        assert!(parse(&["--model", " "]).validate().is_err());
        assert!(parse(&["--inference-base-url", "not a url"]).validate().is_err());
        assert!(parse(&["--inference-base-url", "ftp://x/v1"]).validate().is_err());
    }

    #[test]
    fn test_empty_access_code_is_unset() {
        assert_eq!(parse(&["--access-code", ""]).access_code(), None);
        assert_eq!(parse(&["--access-code", "s3cret"]).access_code(), Some("s3cret"));
    }
}
