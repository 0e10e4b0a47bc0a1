//! Pay-per-mint NFT server.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (config.toml in current directory)
//! cargo run -p mintgate-server --release
//!
//! # Run with custom config path
//! CONFIG=/path/to/config.toml cargo run -p mintgate-server
//!
//! # Configure logging level
//! RUST_LOG=debug cargo run -p mintgate-server
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG`: Path to TOML configuration file (default: `config.toml`)
//! - `HOST`: Override bind address (default: `0.0.0.0`)
//! - `PORT`: Override port (default: `3000`)
//! - `RUST_LOG`: Log level filter (default: `info`)

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use mintgate::facilitator::Facilitator;
use mintgate::gateway::Gateway;
use mintgate::settlement::SettlementCoordinator;
use mintgate::timestamp::UnixTimestamp;
use mintgate_evm::NftMinter;
use mintgate_http::facilitator_client::FacilitatorClient;
use mintgate_http::paygate::{self, MintGate};
use mintgate_server::config::ServerConfig;
use mintgate_server::routes;
use tracing_subscriber::EnvFilter;

/// Sells NFT mints for x402 payments.
#[derive(Debug, Parser)]
#[command(name = "mintgate-server", version, about, long_about = None)]
struct Cli {
    /// Configuration file path.
    #[arg(short, long, env = "CONFIG", default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(cli).await {
        tracing::error!("mintgate failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::load(&cli.config)?;
    let catalog = config.catalog()?;
    let offer = config.offer()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        accepts = catalog.accepted().len(),
        unit_price = %offer.unit_price,
        "Loaded configuration"
    );

    let mut facilitator = FacilitatorClient::try_from(config.facilitator.url.as_str())?;
    if let Some(token) = &config.facilitator.bearer_token {
        facilitator = facilitator.with_bearer_token(token)?;
    }
    if let Some(key) = &config.facilitator.api_key {
        facilitator = facilitator.with_api_key(key)?;
    }
    if let Some(secs) = config.facilitator.timeout_secs {
        facilitator = facilitator.with_timeout(Duration::from_secs(secs));
    }

    let minter = NftMinter::connect(
        &config.mint.rpc_url,
        config.mint.contract,
        &config.mint.minter_key,
    )?
    .with_confirmations(config.mint.confirmations)
    .with_receipt_timeout(Duration::from_secs(config.mint.receipt_timeout_secs));
    tracing::info!(
        contract = %minter.contract(),
        minter = %minter.signer(),
        facilitator = %facilitator.base_url(),
        "Connected mint backends"
    );

    let gateway = Gateway::new(
        Arc::new(facilitator),
        Arc::new(minter),
        config.gateway_config(),
    );
    tokio::spawn(purge_loop(
        gateway.coordinator().clone(),
        Duration::from_secs(config.gateway.purge_interval_secs.max(1)),
    ));

    let gate = MintGate::new(gateway, catalog, offer, config.base_url.clone());
    let app = routes::app(paygate::router(gate), config.collection.clone());

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("mintgate listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("mintgate shut down gracefully");
    Ok(())
}

/// Drops settled nonces whose authorization has expired.
async fn purge_loop<F: Facilitator>(coordinator: SettlementCoordinator<F>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        let purged = coordinator.purge_expired(UnixTimestamp::now());
        if purged > 0 {
            tracing::debug!(purged, remaining = coordinator.len(), "Purged expired nonces");
        }
    }
}

/// Waits for Ctrl-C or SIGTERM (Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    () = ctrl_c => tracing::info!("Received Ctrl-C, shutting down..."),
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {e}");
                ctrl_c.await;
                tracing::info!("Received Ctrl-C, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
        tracing::info!("Received Ctrl-C, shutting down...");
    }
}
