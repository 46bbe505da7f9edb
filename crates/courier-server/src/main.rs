//! # Courier Server
//!
//! HTTP front end for the Courier publish/dispatch broker.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! courier
//!
//! # Run with environment variables
//! COURIER_PORT=5000 COURIER_HOST=0.0.0.0 courier
//! ```
//!
//! A `courier.toml` in the working directory (or under /etc/courier/ or
//! ~/.config/courier/) overrides the defaults.

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier=debug,courier_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Courier server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
