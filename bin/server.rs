// Parking Access - Web Server
// REST API with Axum over the shared AccessController

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parking_access::api::{build_router, AppState};
use parking_access::store::count_spots;
use parking_access::{AccessController, ParkingConfig, SystemClock};

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "parking-server")]
#[command(about = "HTTP API for residential parking access control")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "PARKING_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides config)
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parking_access=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!("Starting Parking Access server v{}", parking_access::VERSION);

    let config = ParkingConfig::load(args.config.as_deref())?;
    let store = config.open_store()?;
    let (resident_spots, visitor_spots) = count_spots(store.as_ref())?;
    info!(resident_spots, visitor_spots, "facility layout loaded");

    let controller = AccessController::bootstrap(
        store,
        config.tariff.calculator(),
        Arc::new(SystemClock),
    )
    .context("Failed to load parking state")?;
    info!(
        backend = controller.backend(),
        unit_rate = config.tariff.unit_rate,
        flat_rate = config.tariff.flat_rate,
        "access controller ready"
    );

    let app = build_router(AppState::new(Arc::new(controller)));

    let addr = args.bind.unwrap_or(config.server.bind);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Server running on http://{}", addr);
    info!("   API: http://{}/api/stats", addr);

    axum::serve(listener, app)
        .await
        .context("Server terminated")?;

    Ok(())
}
