//! Logger initialization
//!
//! Console output through `tracing-subscriber`. The level defaults to `info`
//! and follows `RUST_LOG` when set. Records emitted through the `log` facade
//! (teloxide, reqwest) are bridged into the same subscriber.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. Call once, before anything logs.
pub fn init_logger() -> Result<()> {
    tracing_log::LogTracer::init().map_err(|e| anyhow::anyhow!("Failed to bridge log records: {}", e))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Logs the effective configuration at startup, secrets masked
pub fn log_configuration() {
    use boothcore::config;

    tracing::info!("Database: {}", config::DATABASE_PATH.as_str());
    tracing::info!("Port: {}", *config::PORT);
    match config::BASE_URL.as_deref() {
        Some(url) => tracing::info!("Base URL: {}", url),
        None => tracing::warn!("BASE_URL not set, webhooks cannot be registered"),
    }
    if config::MASTER_BOT_TOKEN.is_some() {
        tracing::info!("Master bot: @{}", config::MASTER_BOT_USERNAME.as_str());
    } else {
        tracing::warn!("MASTER_BOT_TOKEN not set, master bot disabled");
    }
    if config::JWT_SECRET.is_none() {
        tracing::warn!("JWT_SECRET not set, dashboard login disabled");
    }
    tracing::info!(
        admin_policy = config::ADMIN_POLICY.as_str(),
        default_event_fallback = *config::EVENT_DEFAULT_FALLBACK,
        "Bot engine settings"
    );
}
