//! # Tandem CLI Entry Point
//!
//! Main binary for the Tandem RPC endpoint. Starts a serving endpoint,
//! makes one-off RPC calls, and queries peer health and metrics.
//!
//! ## Usage
//!
//! ```bash
//! # Start an endpoint (health-check only; methods are registered in code)
//! tandem serve -b 127.0.0.1:3000
//!
//! # Start from a JSON config file
//! tandem serve -c endpoint.json
//!
//! # Call a method (raw JSON on stdout, pipeable to jq)
//! tandem call http://127.0.0.1:3000 add --args '{"a": 5, "b": 3}'
//!
//! # Query a peer's health report or just its metrics
//! tandem health http://127.0.0.1:3000
//! tandem metrics http://127.0.0.1:3000
//! ```
//!
//! ## URL Format
//!
//! Peer URLs must include the `http://` prefix; TLS termination is expected
//! to live in front of the endpoint.

use anyhow::Result;
use argh::FromArgs;
use serde_json::{json, Value};

use tandem_client::{CallOptions, TandemClient};
use tandem_common::config::{EndpointConfig, RetryOverrides};
use tandem_server::Endpoint;

/// Validates that a URL string starts with http://
fn validate_http_url(url: &str) -> Result<()> {
    if url.starts_with("http://") {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "Invalid server address: '{}' must start with http://",
            url
        ))
    }
}

#[derive(FromArgs)]
/// Tandem - resilient bidirectional RPC over HTTP/2
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
///
/// - **Serve**: run an endpoint with signal-driven graceful shutdown
/// - **Call**: make a single RPC call (unix-friendly JSON output)
/// - **Health** / **Metrics**: query a peer's health report
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Call(CallArgs),
    Health(HealthArgs),
    Metrics(MetricsArgs),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// start a Tandem endpoint
struct ServeArgs {
    /// address to bind the endpoint to, as host:port
    ///
    /// Overrides the host and port from the config file when both are given.
    /// Defaults to "127.0.0.1:3000".
    #[argh(option, short = 'b')]
    bind: Option<String>,

    /// path to a JSON endpoint configuration file
    ///
    /// The file is deserialized into the full endpoint option surface:
    /// CORS, JWT, excluded paths, resilience (timeout / circuit breaker /
    /// retry), and the default per-method bulkhead.
    #[argh(option, short = 'c', long = "config")]
    config: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// call an RPC method on a peer endpoint
struct CallArgs {
    /// address of the endpoint to call
    ///
    /// Must include the http:// prefix (e.g., http://127.0.0.1:3000).
    #[argh(positional)]
    server_address: String,

    /// name of the RPC method to call
    #[argh(positional)]
    method: String,

    /// JSON object with the method parameters, defaults to {}
    #[argh(option, short = 'a', long = "args", default = "\"{}\".into()")]
    args: String,

    /// bearer token sent as Authorization: Bearer <token>
    #[argh(option, long = "token")]
    token: Option<String>,

    /// maximum retries for this call (overrides the default policy)
    #[argh(option, long = "max-retries")]
    max_retries: Option<u32>,

    /// request timeout in milliseconds for this call
    #[argh(option, long = "timeout")]
    timeout_ms: Option<u64>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "health")]
/// fetch a peer endpoint's health report
struct HealthArgs {
    /// address of the endpoint to query
    ///
    /// Must include the http:// prefix (e.g., http://127.0.0.1:3000).
    #[argh(positional)]
    server_address: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "metrics")]
/// fetch a peer endpoint's metrics snapshot
struct MetricsArgs {
    /// address of the endpoint to query
    ///
    /// Must include the http:// prefix (e.g., http://127.0.0.1:3000).
    #[argh(positional)]
    server_address: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Initialize tracing only for serve; call/health/metrics keep stdout
    // clean for unix tool usage (piping to jq, etc.).
    if matches!(cli.command, Commands::Serve(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Call(args) => {
            validate_http_url(&args.server_address)?;
            let params: Value = serde_json::from_str(&args.args)
                .map_err(|e| anyhow::anyhow!("Invalid --args JSON: {}", e))?;

            let client = TandemClient::new(EndpointConfig::default())?;
            let options = CallOptions {
                token: args.token,
                request_timeout_ms: args.timeout_ms,
                retry: RetryOverrides {
                    max_retries: args.max_retries,
                    ..Default::default()
                },
                ..Default::default()
            };

            let result = client
                .call(&args.server_address, &args.method, params, &options)
                .await?;
            println!("{}", result);
            Ok(())
        }
        Commands::Health(args) => {
            validate_http_url(&args.server_address)?;
            let report = fetch_health(&args.server_address).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Metrics(args) => {
            validate_http_url(&args.server_address)?;
            let report = fetch_health(&args.server_address).await?;
            println!("{}", serde_json::to_string_pretty(&report["metrics"])?);
            Ok(())
        }
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path, e))?;
            serde_json::from_str::<EndpointConfig>(&raw)
                .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path, e))?
        }
        None => EndpointConfig::default(),
    };

    if let Some(bind) = &args.bind {
        let (host, port) = bind
            .rsplit_once(':')
            .ok_or_else(|| anyhow::anyhow!("Invalid bind address '{}': expected host:port", bind))?;
        config.host = host.to_string();
        config.port = port
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid port in '{}': {}", bind, e))?;
    } else if args.config.is_none() {
        config.host = "127.0.0.1".into();
    }

    // Signals are handled here rather than by the endpoint, so the process
    // exits once the graceful stop completes.
    config.install_signal_handlers = false;

    let endpoint = Endpoint::new(config)?;
    let addr = endpoint.start().await?;
    tracing::info!("Tandem endpoint listening on {}", addr);
    tracing::info!("Serving /health-check; register methods by embedding tandem-server");

    wait_for_shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping");
    endpoint.stop(None).await?;
    Ok(())
}

async fn fetch_health(server_address: &str) -> Result<Value> {
    let client = TandemClient::new(EndpointConfig::default())?;
    let report = client
        .call(
            server_address,
            "health-check",
            json!({}),
            &CallOptions::default(),
        )
        .await?;
    Ok(report)
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = term.recv() => {}
            }
        }
        Err(_) => {
            let _ = ctrl_c.await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_http_url() {
        assert!(validate_http_url("http://127.0.0.1:3000").is_ok());
        assert!(validate_http_url("127.0.0.1:3000").is_err());
        assert!(validate_http_url("https://example.com").is_err());
    }
}
