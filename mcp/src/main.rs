use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use excalidraw_mcp_runtime::{
    DEFAULT_CANVAS_URL, DEFAULT_SERVER_NAME, DEFAULT_TIMEOUT_SECS, McpCommands, McpRuntimeConfig,
    run as run_mcp,
};

#[derive(Parser)]
#[command(
    name = "excalidraw-mcp",
    version,
    about = "Excalidraw MCP server: exposes canvas operations as MCP tools over stdio"
)]
struct Cli {
    /// Canvas service base URL
    #[arg(long, env = "EXCALIDRAW_CANVAS_URL", default_value = DEFAULT_CANVAS_URL)]
    canvas_url: String,

    /// Per-request timeout for canvas calls, in seconds
    #[arg(long, env = "EXCALIDRAW_HTTP_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Name reported in serverInfo
    #[arg(long, env = "EXCALIDRAW_MCP_SERVER_NAME", default_value = DEFAULT_SERVER_NAME)]
    server_name: String,

    #[command(subcommand)]
    command: Option<McpCommands>,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "excalidraw_mcp_runtime=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let config = McpRuntimeConfig {
        canvas_url: cli.canvas_url,
        timeout: Duration::from_secs(cli.timeout_secs),
        server_name: cli.server_name,
    };
    let code = run_mcp(config, cli.command.unwrap_or(McpCommands::Serve)).await;
    std::process::exit(code);
}
