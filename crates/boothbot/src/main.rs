use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use boothbot::cli::{Cli, Commands};
use boothbot::context::Services;
use boothbot::logging::{init_logger, log_configuration};
use boothbot::masterbot::MasterBot;
use boothbot::messenger::{BotClientFactory, TeloxideFactory};
use boothbot::registry::BotRegistry;
use boothbot::server::{start_server, ServerState};
use boothbot::flow::BOT_COMMANDS;
use boothcore::auth::{JwtIssuer, LoginCodeService};
use boothcore::config;
use boothcore::repository::BotRepository;
use boothcore::session::SessionStore;
use boothcore::storage::SqliteRepository;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Load environment variables from .env before any config is read
    let _ = dotenv();

    init_logger()?;

    std::panic::set_hook(Box::new(|panic_info| {
        tracing::error!("Panic caught: {}", panic_info);
    }));

    match cli.command {
        Some(Commands::Run { port }) => run_server(port.unwrap_or(*config::PORT)).await,
        Some(Commands::SetWebhook { bot_id }) => run_set_webhook(&bot_id).await,
        Some(Commands::SweepSessions) => run_sweep().await,
        None => {
            tracing::info!("No command specified, running server");
            run_server(*config::PORT).await
        }
    }
}

fn open_repository() -> Result<Arc<SqliteRepository>> {
    let repo = SqliteRepository::open(&config::DATABASE_PATH)
        .with_context(|| format!("Failed to open database {}", config::DATABASE_PATH.as_str()))?;
    Ok(Arc::new(repo))
}

async fn run_server(port: u16) -> Result<()> {
    log_configuration();

    let repo = open_repository()?;
    let services = Arc::new(Services::new(repo.clone()));
    let factory: Arc<dyn BotClientFactory> = Arc::new(TeloxideFactory::from_config());
    let registry = Arc::new(BotRegistry::new(services.clone(), factory.clone()));
    let shutdown = CancellationToken::new();

    let login = config::JWT_SECRET.as_deref().map(|secret| {
        Arc::new(LoginCodeService::new(
            repo.clone(),
            Arc::new(JwtIssuer::new(secret)),
            config::MASTER_BOT_USERNAME.as_str(),
        ))
    });

    let master = match config::MASTER_BOT_TOKEN.as_deref() {
        Some(token) => match factory.connect(token).await {
            Ok(client) => {
                if let Some(base) = config::BASE_URL.as_deref() {
                    let url = format!("{}/master/webhook", base);
                    match client.messenger.set_webhook(&url).await {
                        Ok(()) => tracing::info!("Master bot webhook set to {}", url),
                        Err(e) => tracing::warn!("Failed to set master bot webhook: {}", e),
                    }
                }
                tracing::info!("Master bot @{} ready", client.username);
                Some(Arc::new(MasterBot::new(
                    client.messenger,
                    repo.clone(),
                    registry.clone(),
                    login.clone(),
                    config::BASE_URL.clone(),
                )))
            }
            Err(e) => {
                tracing::error!("Master bot disabled, token rejected: {}", e);
                None
            }
        },
        None => None,
    };

    let sweeper = services
        .sessions
        .spawn_sweep_task(config::session::sweep_interval(), shutdown.clone());

    let state = ServerState {
        registry,
        master,
        login,
        master_token: config::MASTER_BOT_TOKEN.clone(),
    };

    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move { start_server(port, state, server_shutdown).await });

    tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();

    server.await.context("Server task panicked")??;
    if let Err(e) = sweeper.await {
        tracing::warn!("Session sweeper ended abnormally: {}", e);
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn run_set_webhook(bot_id: &str) -> Result<()> {
    let base = config::BASE_URL
        .as_deref()
        .context("BASE_URL must be set to register webhooks")?;
    let repo = open_repository()?;
    let record = repo
        .find_bot_by_id(bot_id)
        .await?
        .with_context(|| format!("No bot with id {}", bot_id))?;

    let client = TeloxideFactory::from_config().connect(&record.token).await?;
    let url = format!("{}/webhook/{}", base, record.id);
    client.messenger.set_webhook(&url).await?;
    client.messenger.set_commands(BOT_COMMANDS).await?;
    tracing::info!(bot_id = %record.id, username = %client.username, "Webhook set to {}", url);
    Ok(())
}

async fn run_sweep() -> Result<()> {
    let repo = open_repository()?;
    let removed = SessionStore::new(repo).sweep().await?;
    tracing::info!(removed, "Session sweep complete");
    Ok(())
}
