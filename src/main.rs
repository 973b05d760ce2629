//! Shop SOAP service binary.
//!
//! Run with: `shop-soap --config config.yaml`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use shop_soap::{server, Dispatcher, MemoryStore, ShopConfig, ShopContext};
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// SOAP server for the console shop protocol.
///
/// Serves the e-commerce (ECS), catalog (CAS) and identity (IAS) services
/// and issues console-verifiable tickets.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override the listen address from the config file
    #[arg(short, long)]
    address: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting shop SOAP service v{}", env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", args.config.display());

    // Load configuration
    let config = if args.config.exists() {
        let content = tokio::fs::read_to_string(&args.config)
            .await
            .context("Failed to read config file")?;
        ShopConfig::from_yaml(&content).context("Failed to parse config file")?
    } else {
        info!("Config file not found, using defaults");
        ShopConfig::default()
    };

    let encoder = config
        .load_encoder()
        .context("Failed to load ticket key material")?;
    let whitelist = config
        .load_whitelist()
        .context("Failed to load serial whitelist")?;

    let addr = match args.address {
        Some(addr) => addr,
        None => config
            .server
            .address
            .parse()
            .context("Invalid listen address")?,
    };

    info!(
        base_url = %config.server.base_url,
        whitelist = whitelist.is_some(),
        max_body_size = config.service.max_body_size,
        "Configuration loaded"
    );

    let context = ShopContext {
        encoder: Arc::new(encoder),
        store: Arc::new(MemoryStore::new()),
        whitelist: whitelist.map(Arc::new),
        base_url: config.server.base_url.clone(),
    };
    let dispatcher = Arc::new(Dispatcher::with_shop_actions(context));

    server::run_server(addr, dispatcher, config.service.max_body_size, shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Shop SOAP service stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, stopping server");
}
