#![cfg(not(tarpaulin_include))]

use canteen::app;
use canteen::config::Config;
use tracing_subscriber::{EnvFilter, fmt};

/// Main entry point for the canteen web application
///
/// Reads configuration from the environment (see `Config::load`) and serves
/// until Ctrl+C or SIGTERM. Log verbosity follows `RUST_LOG`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::load()?;
    app::run(config).await
}
