//! Test environment: temp SQLite repository, recording messenger and a fake
//! client factory wired into a real registry.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use boothbot::context::{AdminPolicy, Services};
use boothbot::messenger::{BotClient, BotClientFactory};
use boothbot::registry::{BotRegistry, WebhookError};
use boothcore::error::{AppError, AppResult};
use boothcore::events::EventResolver;
use boothcore::repository::{BotRepository, TenantRepository};
use boothcore::session::{Session, SessionStore};
use boothcore::storage::SqliteRepository;
use boothcore::types::{BotRecord, NewBot, NewTenant, TelegramId};

use super::recorder::RecordingMessenger;

pub const BOT_USERNAME: &str = "BoothTestBot";

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(100_000);

/// A token in BotFather's shape, unique per call
pub fn fresh_token() -> String {
    let n = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    format!("{}:{}", n, "A".repeat(35))
}

/// Hands every bot the same recording messenger
pub struct FakeFactory {
    pub messenger: Arc<RecordingMessenger>,
    pub username: String,
    pub connects: AtomicUsize,
    pub reject: AtomicBool,
}

impl FakeFactory {
    pub fn new(messenger: Arc<RecordingMessenger>) -> Self {
        Self {
            messenger,
            username: BOT_USERNAME.to_string(),
            connects: AtomicUsize::new(0),
            reject: AtomicBool::new(false),
        }
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BotClientFactory for FakeFactory {
    async fn connect(&self, _token: &str) -> AppResult<BotClient> {
        // Give concurrent first deliveries a chance to overlap
        tokio::task::yield_now().await;
        if self.reject.load(Ordering::SeqCst) {
            return Err(AppError::Unavailable("Unauthorized".into()));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(BotClient {
            messenger: self.messenger.clone(),
            username: self.username.clone(),
        })
    }
}

pub struct TestEnv {
    _dir: TempDir,
    pub repo: Arc<SqliteRepository>,
    pub messenger: Arc<RecordingMessenger>,
    pub factory: Arc<FakeFactory>,
    pub services: Arc<Services>,
    pub registry: Arc<BotRegistry>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::build(|services| services)
    }

    /// Lets a test swap billing, policy or event fallback
    pub fn build(customize: impl FnOnce(Services) -> Services) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boothbot-test.sqlite");
        let repo = Arc::new(SqliteRepository::open(path.to_str().unwrap()).unwrap());

        let sessions = Arc::new(SessionStore::with_timings(
            repo.clone(),
            Duration::from_secs(30 * 60),
            Duration::from_secs(5),
        ));
        let services = Services::new(repo.clone())
            .with_sessions(sessions)
            .with_events(EventResolver::with_fallback(repo.clone(), false))
            .with_admin_policy(AdminPolicy::Owner);
        let services = Arc::new(customize(services));

        let messenger = Arc::new(RecordingMessenger::new());
        let factory = Arc::new(FakeFactory::new(messenger.clone()));
        let registry = Arc::new(BotRegistry::new(services.clone(), factory.clone()));

        Self {
            _dir: dir,
            repo,
            messenger,
            factory,
            services,
            registry,
        }
    }

    /// Stores a tenant and a bot owned by `owner`
    pub async fn seed_bot(&self, owner: TelegramId) -> BotRecord {
        let tenant = self
            .repo
            .create_tenant(NewTenant {
                telegram_id: Some(owner),
                first_name: Some("Owner".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        self.repo
            .create_bot(NewBot {
                tenant_id: tenant.id,
                token: fresh_token(),
                username: BOT_USERNAME.into(),
                owner_telegram_id: Some(owner),
            })
            .await
            .unwrap()
    }

    pub async fn deliver(&self, bot_id: &str, body: Vec<u8>) -> Result<(), WebhookError> {
        self.registry.handle_webhook(bot_id, &body).await
    }

    /// Delivers and asserts the webhook was accepted
    pub async fn send(&self, bot_id: &str, body: Vec<u8>) {
        self.deliver(bot_id, body).await.unwrap();
    }

    pub async fn session(&self, bot_id: &str, user_id: TelegramId) -> Session {
        self.services.sessions.get(bot_id, user_id).await
    }
}
