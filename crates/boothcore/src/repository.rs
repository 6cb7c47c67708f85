//! Storage seams consumed by the bot engine.
//!
//! Each concern gets its own trait so components depend only on what they
//! touch (the session store only needs [`SessionRepository`], the event
//! resolver only [`EventRepository`]). [`Repository`] bundles them for
//! callers that need everything, and is implemented automatically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppResult;
use crate::session::Session;
use crate::types::{
    AuthCode, AuthCodeStatus, BotRecord, BroadcastLog, BugReport, Event, NewBot, NewBroadcast, NewBugReport, NewEvent,
    NewTenant, NewVisitor, TelegramId, Tenant, Visitor,
};

/// A persisted session together with its last-touch time
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub session: Session,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn load_session(&self, bot_id: &str, user_id: TelegramId) -> AppResult<Option<StoredSession>>;

    /// Inserts or replaces the session row, stamping it with `touched_at`
    async fn save_session(
        &self,
        bot_id: &str,
        user_id: TelegramId,
        session: &Session,
        touched_at: DateTime<Utc>,
    ) -> AppResult<()>;

    async fn delete_session(&self, bot_id: &str, user_id: TelegramId) -> AppResult<()>;

    /// Deletes every session last touched strictly before `cutoff`.
    /// Returns the number of removed rows.
    async fn delete_sessions_idle_since(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;
}

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn find_tenant_by_id(&self, tenant_id: &str) -> AppResult<Option<Tenant>>;
    async fn find_tenant_by_telegram_id(&self, telegram_id: TelegramId) -> AppResult<Option<Tenant>>;
    async fn create_tenant(&self, tenant: NewTenant) -> AppResult<Tenant>;
}

#[async_trait]
pub trait BotRepository: Send + Sync {
    async fn find_bot_by_id(&self, bot_id: &str) -> AppResult<Option<BotRecord>>;
    async fn find_bot_by_token(&self, token: &str) -> AppResult<Option<BotRecord>>;
    async fn list_bots_for_tenant(&self, tenant_id: &str) -> AppResult<Vec<BotRecord>>;
    async fn create_bot(&self, bot: NewBot) -> AppResult<BotRecord>;

    /// Telegram ids granted admin rights on a bot besides its owner
    async fn list_delegate_admins(&self, bot_id: &str) -> AppResult<Vec<TelegramId>>;
    async fn add_delegate_admin(&self, bot_id: &str, telegram_id: TelegramId) -> AppResult<()>;
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn find_event_by_id(&self, event_id: &str) -> AppResult<Option<Event>>;

    /// Slug lookup scoped to one bot
    async fn find_event_by_slug(&self, bot_id: &str, slug: &str) -> AppResult<Option<Event>>;

    /// The bot's most recently created event, if any
    async fn find_default_event_for_bot(&self, bot_id: &str) -> AppResult<Option<Event>>;

    async fn create_event(&self, event: NewEvent) -> AppResult<Event>;

    /// Events of a bot, oldest first
    async fn list_events_for_bot(&self, bot_id: &str) -> AppResult<Vec<Event>>;
}

#[async_trait]
pub trait VisitorRepository: Send + Sync {
    async fn find_visitor_by_bot_and_user(&self, bot_id: &str, telegram_id: TelegramId) -> AppResult<Option<Visitor>>;

    /// Inserts a visitor or updates the existing row for `(bot_id, telegram_id)`
    async fn upsert_visitor(&self, visitor: NewVisitor) -> AppResult<Visitor>;

    /// Visitors of a bot, oldest first
    async fn list_visitors_for_bot(&self, bot_id: &str) -> AppResult<Vec<Visitor>>;
    async fn list_visitors_for_event(&self, event_id: &str) -> AppResult<Vec<Visitor>>;
    async fn count_visitors_for_bot(&self, bot_id: &str) -> AppResult<u64>;
    async fn count_visitors_for_event(&self, event_id: &str) -> AppResult<u64>;

    /// Contacts across every bot a tenant owns
    async fn count_visitors_for_tenant(&self, tenant_id: &str) -> AppResult<u64>;
}

#[async_trait]
pub trait BroadcastRepository: Send + Sync {
    async fn create_broadcast_log(&self, broadcast: NewBroadcast) -> AppResult<BroadcastLog>;
    async fn list_broadcasts_for_bot(&self, bot_id: &str) -> AppResult<Vec<BroadcastLog>>;
}

#[async_trait]
pub trait BugReportRepository: Send + Sync {
    async fn create_bug_report(&self, report: NewBugReport) -> AppResult<BugReport>;
    async fn list_bug_reports(&self) -> AppResult<Vec<BugReport>>;
}

#[async_trait]
pub trait AuthCodeRepository: Send + Sync {
    async fn create_auth_code(&self, code: AuthCode) -> AppResult<()>;
    async fn find_auth_code(&self, code: &str) -> AppResult<Option<AuthCode>>;

    /// Moves a pending code to `status`, recording who resolved it.
    /// Returns `false` when the code does not exist or is no longer pending.
    async fn resolve_auth_code(
        &self,
        code: &str,
        status: AuthCodeStatus,
        telegram_id: TelegramId,
        telegram_username: Option<String>,
        first_name: Option<String>,
    ) -> AppResult<bool>;

    async fn delete_auth_code(&self, code: &str) -> AppResult<()>;
}

/// Everything the engine consumes from storage
pub trait Repository:
    SessionRepository
    + TenantRepository
    + BotRepository
    + EventRepository
    + VisitorRepository
    + BroadcastRepository
    + BugReportRepository
    + AuthCodeRepository
{
}

impl<T> Repository for T where
    T: SessionRepository
        + TenantRepository
        + BotRepository
        + EventRepository
        + VisitorRepository
        + BroadcastRepository
        + BugReportRepository
        + AuthCodeRepository
{
}
