mod server;
mod settings;
mod stripe;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = settings::Config::load();

    // Missing keys are not fatal; each request path reports its own failure.
    for key in cfg.stripe.missing_keys() {
        tracing::warn!(key, "Stripe configuration value is not set");
    }

    let state = server::AppState::try_new(&cfg)?;
    tracing::info!(port = cfg.server_port, "Starting Stripe checkout service");

    server::start(&cfg, state).await
}
