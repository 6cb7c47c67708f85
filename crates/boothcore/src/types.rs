//! Persisted records shared by storage, flows, and the HTTP layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Opaque bot identifier (UUID string), shared with the management API
pub type BotId = String;
/// Opaque event identifier (UUID string)
pub type EventId = String;
/// Telegram user id
pub type TelegramId = i64;

/// Source tag for leads that arrived without an event deep link
pub const DIRECT_SOURCE: &str = "direct";

/// Organizer account owning zero or more bots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub email: Option<String>,
    pub telegram_id: Option<TelegramId>,
    pub first_name: Option<String>,
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields for creating a tenant (or refreshing its Telegram profile)
#[derive(Debug, Clone, Default)]
pub struct NewTenant {
    pub email: Option<String>,
    pub telegram_id: Option<TelegramId>,
    pub first_name: Option<String>,
    pub username: Option<String>,
}

/// A Telegram bot credential owned by a tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotRecord {
    pub id: BotId,
    pub tenant_id: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub username: String,
    pub owner_telegram_id: Option<TelegramId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBot {
    pub tenant_id: String,
    pub token: String,
    pub username: String,
    pub owner_telegram_id: Option<TelegramId>,
}

/// Optional grouping of leads under one bot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub bot_id: BotId,
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Deep-link payload for this event: the slug when set, the id otherwise
    pub fn link_key(&self) -> &str {
        self.slug.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewEvent {
    pub bot_id: BotId,
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Captured registrant, unique per (bot_id, telegram_id)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visitor {
    pub id: String,
    pub bot_id: BotId,
    pub event_id: Option<EventId>,
    pub source: Option<String>,
    pub telegram_id: TelegramId,
    pub telegram_username: Option<String>,
    pub full_name: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub wallet_address: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Upsert payload for a visitor, keyed by (bot_id, telegram_id)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewVisitor {
    pub bot_id: BotId,
    pub event_id: Option<EventId>,
    pub source: Option<String>,
    pub telegram_id: TelegramId,
    pub telegram_username: Option<String>,
    pub full_name: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub wallet_address: Option<String>,
    pub notes: Option<String>,
}

/// Aggregate record of one broadcast run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBroadcast {
    pub bot_id: BotId,
    pub event_id: Option<EventId>,
    pub message: String,
    pub sent_count: u64,
    pub failed_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BroadcastLog {
    pub id: String,
    pub bot_id: BotId,
    pub event_id: Option<EventId>,
    pub message: String,
    pub sent_count: u64,
    pub failed_count: u64,
    pub created_at: DateTime<Utc>,
}

/// Problem report filed through the master bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBugReport {
    pub telegram_id: TelegramId,
    pub username: Option<String>,
    pub report: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BugReport {
    pub id: String,
    pub telegram_id: TelegramId,
    pub username: Option<String>,
    pub report: String,
    pub created_at: DateTime<Utc>,
}

/// Status of a deep-link login code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuthCodeStatus {
    Pending,
    Approved,
    Denied,
}

/// One-time deep-link login code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCode {
    pub code: String,
    pub status: AuthCodeStatus,
    pub telegram_id: Option<TelegramId>,
    pub telegram_username: Option<String>,
    pub first_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
