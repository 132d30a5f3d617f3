use anyhow::{Context, Result};
use clap::Parser;
use limit_req::config::Config;
use limit_req::rate_limiter::RateLimiter;
use limit_req::server::Server;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "limit-req", version, about = "Distributed leaky-bucket request limiter")]
struct Args {
    /// Path to the JSON limiter configuration
    #[arg(short, long, env = "LIMIT_REQ_CONFIG")]
    config: PathBuf,

    /// Address the decision service listens on
    #[arg(short, long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let args = Args::parse();

    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("limit_req={},tower_http=debug", config.log_level.as_filter()).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting limit-req service");
    tracing::info!(
        zone = %config.rule.zone,
        rate = %config.rule.rate,
        burst = config.rule.burst,
        interval = config.rule.interval,
        reader = %config.store.reader.label(),
        writers = config.store.writers.len(),
        "Configuration loaded"
    );

    let rate_limiter = RateLimiter::from_config(&config).context("Failed to create rate limiter")?;

    Server::new(args.bind, Arc::new(rate_limiter))
        .run()
        .await
        .context("Server error")?;

    Ok(())
}
