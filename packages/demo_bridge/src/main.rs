use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use demo_bridge::config::DEFAULT_CONFIG_FILE;
use demo_bridge::{AppState, BridgeConfig, FileConfig, create_router, load_config};

#[derive(Parser)]
#[command(name = "demo-bridge")]
#[command(about = "Run live terminal demos for browser previews over WebSocket")]
struct Args {
    /// Config file with [server], [session] and [demos.<name>] tables
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind to
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port to listen on (0 picks a free port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_directive = if args.debug {
        "demo_bridge=debug,demo_launcher=debug,tower_http=debug,info"
    } else {
        "demo_bridge=info,demo_launcher=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let config_path = match args.config {
        Some(path) => {
            if !path.exists() {
                bail!("Config file not found: {}", path.display());
            }
            path
        }
        None => PathBuf::from(DEFAULT_CONFIG_FILE),
    };

    let file_config: FileConfig = load_config(&config_path)
        .extract()
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    let config = BridgeConfig::from_file_config(file_config).with_overrides(args.host, args.port);

    if config.registry.is_empty() {
        warn!(
            "No demos configured; add [demos.<name>] tables to {}",
            config_path.display()
        );
    }
    config.log_summary();

    let state = AppState::from_config(&config);
    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr()?)
        .await
        .context("Failed to bind listener")?;
    let actual_addr = listener.local_addr()?;

    // Machine-readable line for whoever launched us
    println!("BRIDGE_ADDR={}", actual_addr);
    info!("Demo bridge listening on http://{}", actual_addr);
    info!("  GET /           - Preview page");
    info!("  GET /health     - Health check");
    info!("  GET /api/demos  - Demo catalog");
    info!("  GET /ws         - Preview WebSocket");

    let shutdown = state.shutdown.clone();
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, stopping demos...");
        shutdown.cancel();
    };

    let server_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error");

    let drain = config.session.exit_timeout + Duration::from_secs(1);
    if tokio::time::timeout(drain, state.close_connections())
        .await
        .is_err()
    {
        warn!("Some connections did not finish within {:?}", drain);
    }

    info!("Shutdown complete");
    server_result
}
