//! Attaches an optional event to a conversation from a `/start` payload.

use std::sync::Arc;

use crate::config;
use crate::repository::EventRepository;
use crate::session::Session;
use crate::types::Event;
use crate::validation::is_uuid_like;

/// Prefix of the legacy `event_<id>` deep-link payload
const LEGACY_EVENT_PREFIX: &str = "event_";

/// Returns the payload token of a `/start` command text, if any.
///
/// Accepts `/start`, `/start@SomeBot` and surrounding whitespace; only the
/// first token after the command is considered.
pub fn start_payload(text: &str) -> Option<&str> {
    let mut parts = text.split_whitespace();
    let command = parts.next()?;
    let name = command.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name);
    if name != "start" {
        return None;
    }
    parts.next()
}

/// True for payloads reserved for dashboard login approval
pub fn is_login_payload(payload: &str) -> bool {
    payload.starts_with(config::auth::LOGIN_PAYLOAD_PREFIX)
}

/// Resolves deep-link payloads to events owned by a bot
#[derive(Clone)]
pub struct EventResolver {
    events: Arc<dyn EventRepository>,
    default_fallback: bool,
}

impl EventResolver {
    pub fn new(events: Arc<dyn EventRepository>) -> Self {
        Self::with_fallback(events, *config::EVENT_DEFAULT_FALLBACK)
    }

    /// `default_fallback` attaches the bot's latest event to a payload-less
    /// `/start` when the conversation has none yet.
    pub fn with_fallback(events: Arc<dyn EventRepository>, default_fallback: bool) -> Self {
        Self {
            events,
            default_fallback,
        }
    }

    /// Applies a `/start` payload to the session and returns the event id
    /// in effect afterwards.
    ///
    /// A payload that resolves to nothing leaves the session as it was.
    pub async fn apply(&self, bot_id: &str, payload: Option<&str>, session: &mut Session) -> Option<String> {
        let payload = payload.map(str::trim).filter(|p| !p.is_empty());

        match payload {
            None => {
                if session.event_id.is_none() && self.default_fallback {
                    if let Some(event) = self.lookup_default(bot_id).await {
                        tracing::debug!(bot_id, event_id = %event.id, "Attached default event");
                        attach(session, &event);
                    }
                }
            }
            Some(p) if is_login_payload(p) => {}
            Some(p) => match self.resolve(bot_id, p).await {
                Some(event) => {
                    tracing::debug!(bot_id, event_id = %event.id, payload = p, "Resolved event from deep link");
                    attach(session, &event);
                }
                None => tracing::debug!(bot_id, payload = p, "Deep-link payload matched no event"),
            },
        }

        session.event_id.clone()
    }

    /// Resolves a payload: legacy `event_<id>`, then slug within the bot,
    /// then a raw id. Only events owned by `bot_id` are ever returned.
    pub async fn resolve(&self, bot_id: &str, payload: &str) -> Option<Event> {
        if let Some(id) = payload.strip_prefix(LEGACY_EVENT_PREFIX) {
            if let Some(event) = self.lookup_id(bot_id, id).await {
                return Some(event);
            }
        }

        if let Some(event) = self.lookup_slug(bot_id, payload).await {
            return Some(event);
        }

        if is_uuid_like(payload) {
            return self.lookup_id(bot_id, payload).await;
        }

        None
    }

    async fn lookup_id(&self, bot_id: &str, id: &str) -> Option<Event> {
        match self.events.find_event_by_id(id).await {
            Ok(Some(event)) if event.bot_id == bot_id => Some(event),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(bot_id, error = %e, "Event lookup by id failed");
                None
            }
        }
    }

    async fn lookup_slug(&self, bot_id: &str, slug: &str) -> Option<Event> {
        self.events.find_event_by_slug(bot_id, slug).await.unwrap_or_else(|e| {
            tracing::warn!(bot_id, error = %e, "Event lookup by slug failed");
            None
        })
    }

    async fn lookup_default(&self, bot_id: &str) -> Option<Event> {
        self.events.find_default_event_for_bot(bot_id).await.unwrap_or_else(|e| {
            tracing::warn!(bot_id, error = %e, "Default event lookup failed");
            None
        })
    }
}

fn attach(session: &mut Session, event: &Event) {
    let key = event.link_key().to_string();
    session.event_id = Some(event.id.clone());
    session.source = Some(format!("event:{}", key));
    session.event_slug = Some(key);
}
