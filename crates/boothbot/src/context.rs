//! Per-update context handed through the middleware pipeline, and the
//! services every bot instance shares.

use std::sync::Arc;

use boothcore::billing::{BillingOracle, RepositoryBillingOracle};
use boothcore::config;
use boothcore::error::AppResult;
use boothcore::events::EventResolver;
use boothcore::repository::Repository;
use boothcore::session::{Session, SessionStore};
use boothcore::types::{BotRecord, TelegramId};

use crate::messenger::{Messenger, OutgoingFile, OutgoingText};
use crate::update::Incoming;

/// Who may run admin commands on a bot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AdminPolicy {
    /// Only the bot's `owner_telegram_id`
    #[default]
    Owner,
    /// The owner plus the bot's delegate-admin list
    Delegates,
}

impl AdminPolicy {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "delegates" => Self::Delegates,
            "owner" => Self::Owner,
            other => {
                tracing::warn!("Unknown ADMIN_POLICY '{}', falling back to owner", other);
                Self::Owner
            }
        }
    }

    pub fn from_config() -> Self {
        Self::parse(config::ADMIN_POLICY.as_str())
    }
}

/// Storage, sessions, event resolution and billing shared by all bots
pub struct Services {
    pub repo: Arc<dyn Repository>,
    pub sessions: Arc<SessionStore>,
    pub events: EventResolver,
    pub billing: Arc<dyn BillingOracle>,
    pub admin_policy: AdminPolicy,
}

impl Services {
    /// Wires everything around one repository, settings taken from config
    pub fn new<R: Repository + 'static>(repo: Arc<R>) -> Self {
        let sessions = Arc::new(SessionStore::new(repo.clone()));
        let events = EventResolver::new(repo.clone());
        let billing = Arc::new(RepositoryBillingOracle::new(repo.clone()));
        Self {
            repo,
            sessions,
            events,
            billing,
            admin_policy: AdminPolicy::from_config(),
        }
    }

    pub fn with_sessions(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_events(mut self, events: EventResolver) -> Self {
        self.events = events;
        self
    }

    pub fn with_billing(mut self, billing: Arc<dyn BillingOracle>) -> Self {
        self.billing = billing;
        self
    }

    pub fn with_admin_policy(mut self, policy: AdminPolicy) -> Self {
        self.admin_policy = policy;
        self
    }
}

/// Everything a handler sees while processing one update
pub struct UpdateContext {
    pub bot: BotRecord,
    /// Username reported by `getMe`, used for deep links
    pub bot_username: String,
    pub messenger: Arc<dyn Messenger>,
    pub services: Arc<Services>,
    pub incoming: Incoming,
    pub session: Session,
    /// Event in effect for this update after resolution
    pub event_id: Option<String>,
}

impl UpdateContext {
    pub fn bot_id(&self) -> &str {
        &self.bot.id
    }

    pub fn user_id(&self) -> TelegramId {
        self.incoming.sender.id
    }

    pub fn chat_id(&self) -> i64 {
        self.incoming.chat_id
    }

    pub fn repo(&self) -> &dyn Repository {
        self.services.repo.as_ref()
    }

    pub async fn reply(&self, message: OutgoingText) -> AppResult<()> {
        self.messenger.send_text(self.chat_id(), message).await
    }

    pub async fn reply_html(&self, text: impl Into<String>) -> AppResult<()> {
        self.reply(OutgoingText::html(text)).await
    }

    pub async fn reply_plain(&self, text: impl Into<String>) -> AppResult<()> {
        self.reply(OutgoingText::plain(text)).await
    }

    pub async fn reply_document(&self, file: OutgoingFile) -> AppResult<()> {
        self.messenger.send_document(self.chat_id(), file).await
    }

    pub async fn reply_photo(&self, file: OutgoingFile) -> AppResult<()> {
        self.messenger.send_photo(self.chat_id(), file).await
    }

    /// Stops the client-side spinner; failures only matter to the client
    pub async fn answer_callback(&self, callback_id: &str) {
        if let Err(e) = self.messenger.answer_callback(callback_id).await {
            tracing::debug!(bot_id = %self.bot.id, "Failed to answer callback query: {}", e);
        }
    }
}
