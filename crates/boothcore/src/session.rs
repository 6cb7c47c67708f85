//! Per-(bot, user) conversation sessions.
//!
//! [`SessionStore`] fronts a [`SessionRepository`] with a short-lived
//! read-through cache. Storage failures never fail an update: a failed read
//! yields a fresh default session and a failed write is logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config;
use crate::error::{AppError, AppResult};
use crate::repository::SessionRepository;
use crate::types::TelegramId;

/// Where a conversation currently is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    #[default]
    Idle,
    CollectingName,
    CollectingCompany,
    CollectingTitle,
    CollectingEmail,
    CollectingPhone,
    CollectingWallet,
    CollectingNotes,
    Confirming,
    CreatingEvent,
    CreatingEventSlug,
}

impl ConversationState {
    /// The profile field a collecting state asks for
    pub fn collected_field(self) -> Option<Field> {
        match self {
            Self::CollectingName => Some(Field::FullName),
            Self::CollectingCompany => Some(Field::Company),
            Self::CollectingTitle => Some(Field::Title),
            Self::CollectingEmail => Some(Field::Email),
            Self::CollectingPhone => Some(Field::Phone),
            Self::CollectingWallet => Some(Field::WalletAddress),
            Self::CollectingNotes => Some(Field::Notes),
            _ => None,
        }
    }
}

/// A visitor profile field.
///
/// The string form is the suffix used by `skip_<field>` and `edit_<field>`
/// callback data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Field {
    #[strum(serialize = "name")]
    FullName,
    Company,
    Title,
    Email,
    Phone,
    #[strum(serialize = "wallet")]
    WalletAddress,
    Notes,
}

impl Field {
    pub fn collecting_state(self) -> ConversationState {
        match self {
            Self::FullName => ConversationState::CollectingName,
            Self::Company => ConversationState::CollectingCompany,
            Self::Title => ConversationState::CollectingTitle,
            Self::Email => ConversationState::CollectingEmail,
            Self::Phone => ConversationState::CollectingPhone,
            Self::WalletAddress => ConversationState::CollectingWallet,
            Self::Notes => ConversationState::CollectingNotes,
        }
    }
}

/// Profile accumulated while collecting, committed on save
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisitorData {
    pub full_name: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub wallet_address: Option<String>,
    pub notes: Option<String>,
}

impl VisitorData {
    pub fn set(&mut self, field: Field, value: String) {
        let slot = match field {
            Field::FullName => &mut self.full_name,
            Field::Company => &mut self.company,
            Field::Title => &mut self.title,
            Field::Email => &mut self.email,
            Field::Phone => &mut self.phone,
            Field::WalletAddress => &mut self.wallet_address,
            Field::Notes => &mut self.notes,
        };
        *slot = Some(value);
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Admin event-creation draft
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventDraft {
    pub name: Option<String>,
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    pub state: ConversationState,
    pub event_id: Option<String>,
    pub event_slug: Option<String>,
    /// Provenance tag, `event:<slug-or-id>` once an event is attached
    pub source: Option<String>,
    pub visitor_data: VisitorData,
    pub event_data: Option<EventDraft>,
    /// Field being re-entered from the confirmation screen
    pub editing: Option<Field>,
}

impl Session {
    /// Back to idle with nothing collected. The event context is sticky and
    /// survives, so a returning visitor stays attributed to the same event.
    pub fn reset(&mut self) {
        self.state = ConversationState::Idle;
        self.visitor_data = VisitorData::default();
        self.event_data = None;
        self.editing = None;
    }
}

type SessionKey = (String, TelegramId);

#[derive(Debug, Clone)]
struct CachedSession {
    session: Session,
    touched_at: DateTime<Utc>,
}

/// Session store with a read-through cache and inactivity expiry
pub struct SessionStore {
    backend: Arc<dyn SessionRepository>,
    cache: Cache<SessionKey, CachedSession>,
    timeout: Duration,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn SessionRepository>) -> Self {
        Self::with_timings(backend, config::session::timeout(), config::session::cache_freshness())
    }

    /// `timeout` is the inactivity window, `freshness` how long a cached
    /// copy is served without going back to storage.
    pub fn with_timings(backend: Arc<dyn SessionRepository>, timeout: Duration, freshness: Duration) -> Self {
        let cache = Cache::builder().max_capacity(100_000).time_to_live(freshness).build();
        Self {
            backend,
            cache,
            timeout,
        }
    }

    fn is_idle(&self, touched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(touched_at)
            .to_std()
            .map(|idle| idle > self.timeout)
            .unwrap_or(false)
    }

    /// Current session for the pair, or a fresh default one
    pub async fn get(&self, bot_id: &str, user_id: TelegramId) -> Session {
        let key = (bot_id.to_string(), user_id);
        let now = Utc::now();

        if let Some(cached) = self.cache.get(&key).await {
            if !self.is_idle(cached.touched_at, now) {
                return cached.session;
            }
            self.cache.invalidate(&key).await;
        }

        match self.backend.load_session(bot_id, user_id).await {
            Ok(Some(stored)) if !self.is_idle(stored.updated_at, now) => {
                self.cache
                    .insert(
                        key,
                        CachedSession {
                            session: stored.session.clone(),
                            touched_at: stored.updated_at,
                        },
                    )
                    .await;
                stored.session
            }
            Ok(_) => Session::default(),
            Err(e) => {
                tracing::warn!(bot_id, user_id, error = %e, "Session read failed, starting fresh");
                Session::default()
            }
        }
    }

    /// Stores the session. The cache is updated first; a failed backend
    /// write is logged and the caller carries on.
    pub async fn set(&self, bot_id: &str, user_id: TelegramId, session: Session) {
        let now = Utc::now();
        self.cache
            .insert(
                (bot_id.to_string(), user_id),
                CachedSession {
                    session: session.clone(),
                    touched_at: now,
                },
            )
            .await;

        if let Err(e) = self.backend.save_session(bot_id, user_id, &session, now).await {
            tracing::warn!(bot_id, user_id, error = %e, "Session write failed");
        }
    }

    /// Resets the stored session, keeping its event context
    pub async fn reset(&self, bot_id: &str, user_id: TelegramId) {
        let mut session = self.get(bot_id, user_id).await;
        session.reset();
        self.set(bot_id, user_id, session).await;
    }

    /// Forgets the session entirely
    pub async fn clear(&self, bot_id: &str, user_id: TelegramId) {
        self.cache.invalidate(&(bot_id.to_string(), user_id)).await;
        if let Err(e) = self.backend.delete_session(bot_id, user_id).await {
            tracing::warn!(bot_id, user_id, error = %e, "Session delete failed");
        }
    }

    /// Removes sessions idle for longer than the timeout as of `now`.
    /// Sessions touched inside the window are left alone.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let window = chrono::Duration::from_std(self.timeout).map_err(|e| AppError::Validation(e.to_string()))?;
        let removed = self.backend.delete_sessions_idle_since(now - window).await?;
        if removed > 0 {
            tracing::info!(removed, "Swept idle sessions");
        }
        Ok(removed)
    }

    pub async fn sweep(&self) -> AppResult<u64> {
        self.sweep_at(Utc::now()).await
    }

    /// Runs [`sweep`](Self::sweep) every `every` until `shutdown` fires
    pub fn spawn_sweep_task(self: &Arc<Self>, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("Session sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = store.sweep().await {
                            tracing::warn!(error = %e, "Session sweep failed");
                        }
                    }
                }
            }
        })
    }
}
