//! Owner-only commands: stats, export, broadcast and event management.

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use indoc::{formatdoc, indoc};

use boothcore::billing::{billing_message, pro_cost};
use boothcore::config;
use boothcore::config::billing::FREE_CONTACT_LIMIT;
use boothcore::error::AppResult;
use boothcore::export::{export_file_name, visitors_to_csv};
use boothcore::qr::{deep_link, render_png};
use boothcore::session::{ConversationState, EventDraft};
use boothcore::types::{NewBroadcast, NewEvent, TelegramId, DIRECT_SOURCE};
use boothcore::validation::{is_acceptable_slug, slugify, MAX_SLUG_LEN};

use super::escape_html;
use crate::context::{AdminPolicy, UpdateContext};
use crate::messenger::{Messenger, OutgoingFile, OutgoingText};

pub const DENIED_TEXT: &str = "⛔ This command is only available to bot admins.";
pub const NO_RECIPIENTS_TEXT: &str = "No leads to broadcast to yet.";

const PANEL_TEXT: &str = indoc! {"
    🔧 <b>Admin Commands</b>

    /stats - View lead statistics
    /export - Export all leads to CSV
    /export &lt;slug&gt; - Export one event's leads
    /broadcast &lt;message&gt; - Message all leads

    <b>Events (optional):</b>
    /newevent - Create a new event
    /events - List your events

    💡 <i>Events are optional! Leads are captured even without events.</i>"};

const HELP_ADMIN_SECTION: &str = indoc! {"
    <b>Admin Commands:</b>
    /admin - Show admin panel
    /stats - View lead statistics
    /export - Export leads to CSV
    /broadcast - Message all leads
    /newevent - Create event (optional)
    /events - List events

"};

const HELP_VISITOR_SECTION: &str = indoc! {"
    <b>Visitor Commands:</b>
    /start - Start registration
    /help - Show this message"};

const NEW_EVENT_TEXT: &str = indoc! {"
    🎪 <b>Create New Event</b>

    Events help you track which leads came from where.

    What's the name of your event?

    <i>Example: ETH Denver 2026</i>"};

const EVENT_NAME_TOO_SHORT_TEXT: &str = "Please provide a valid event name (at least 2 characters).";

const EVENT_SLUG_PROMPT: &str = indoc! {"
    That name doesn't make a usable link.

    Send a short slug for the registration link: lowercase letters, numbers and dashes.

    <i>Example: eth-denver</i>"};

const NO_EVENTS_TEXT: &str = indoc! {"
    📭 <b>No events yet</b>

    Events are optional — leads are captured with or without them.

    Use /newevent to create one if you want to track sources."};

const BROADCAST_USAGE_TEXT: &str = indoc! {"
    📢 <b>Broadcast Message</b>

    Usage: /broadcast &lt;message&gt;

    This will send a message to ALL registered leads."};

/// The bot owner always; delegates too under [`AdminPolicy::Delegates`]
pub async fn is_admin(ctx: &UpdateContext) -> bool {
    let user_id = ctx.user_id();
    if ctx.bot.owner_telegram_id == Some(user_id) {
        return true;
    }
    if ctx.services.admin_policy != AdminPolicy::Delegates {
        return false;
    }
    match ctx.repo().list_delegate_admins(&ctx.bot.id).await {
        Ok(ids) => ids.contains(&user_id),
        Err(e) => {
            tracing::warn!(bot_id = %ctx.bot.id, user_id, "Delegate lookup failed: {}", e);
            false
        }
    }
}

/// Replies with the denial and returns false for non-admins
async fn require_admin(ctx: &UpdateContext) -> AppResult<bool> {
    if is_admin(ctx).await {
        return Ok(true);
    }
    tracing::debug!(bot_id = %ctx.bot.id, user_id = ctx.user_id(), "Admin command denied");
    ctx.reply_plain(DENIED_TEXT).await?;
    Ok(false)
}

pub async fn panel(ctx: &mut UpdateContext) -> AppResult<()> {
    if !require_admin(ctx).await? {
        return Ok(());
    }
    ctx.reply_html(PANEL_TEXT).await
}

pub async fn help(ctx: &mut UpdateContext) -> AppResult<()> {
    let mut text = String::from("📚 <b>Moongate Booths Help</b>\n\n");
    if is_admin(ctx).await {
        text.push_str(HELP_ADMIN_SECTION);
    }
    text.push_str(HELP_VISITOR_SECTION);
    ctx.reply_html(text).await
}

pub async fn new_event(ctx: &mut UpdateContext) -> AppResult<()> {
    if !require_admin(ctx).await? {
        return Ok(());
    }
    ctx.session.state = ConversationState::CreatingEvent;
    ctx.session.event_data = Some(EventDraft::default());
    ctx.reply_html(NEW_EVENT_TEXT).await
}

pub async fn event_name_input(ctx: &mut UpdateContext, text: &str) -> AppResult<()> {
    if ctx.session.state != ConversationState::CreatingEvent {
        return Ok(());
    }
    let name = text.trim();
    if name.chars().count() < 2 {
        return ctx.reply_plain(EVENT_NAME_TOO_SHORT_TEXT).await;
    }

    let slug = slugify(name);
    if !is_acceptable_slug(&slug) {
        ctx.session.event_data = Some(EventDraft {
            name: Some(name.to_string()),
            slug: None,
        });
        ctx.session.state = ConversationState::CreatingEventSlug;
        return ctx.reply_html(EVENT_SLUG_PROMPT).await;
    }

    create_event(ctx, name.to_string(), slug).await
}

pub async fn event_slug_input(ctx: &mut UpdateContext, text: &str) -> AppResult<()> {
    if ctx.session.state != ConversationState::CreatingEventSlug {
        return Ok(());
    }
    let Some(name) = ctx.session.event_data.as_ref().and_then(|d| d.name.clone()) else {
        ctx.session.reset();
        return ctx.reply_plain(super::visitor::SESSION_LOST_TEXT).await;
    };

    let slug = slugify(text);
    if !is_acceptable_slug(&slug) {
        return ctx.reply_html(EVENT_SLUG_PROMPT).await;
    }
    create_event(ctx, name, slug).await
}

/// First free slug for this bot: `base`, then `base-2`, `base-3`, ...
async fn unique_slug(ctx: &UpdateContext, base: &str) -> AppResult<String> {
    let mut candidate = base.to_string();
    let mut n: u32 = 1;
    while ctx.repo().find_event_by_slug(&ctx.bot.id, &candidate).await?.is_some() {
        n += 1;
        let suffix = format!("-{}", n);
        let keep = MAX_SLUG_LEN.saturating_sub(suffix.len()).min(base.len());
        let stem = base.get(..keep).unwrap_or(base).trim_end_matches('-');
        candidate = format!("{}{}", stem, suffix);
    }
    Ok(candidate)
}

async fn create_event(ctx: &mut UpdateContext, name: String, base_slug: String) -> AppResult<()> {
    let created = match unique_slug(ctx, &base_slug).await {
        Ok(slug) => {
            ctx.repo()
                .create_event(NewEvent {
                    bot_id: ctx.bot.id.clone(),
                    name: name.clone(),
                    slug: Some(slug),
                    ..Default::default()
                })
                .await
        }
        Err(e) => Err(e),
    };

    ctx.session.state = ConversationState::Idle;
    ctx.session.event_data = None;

    let event = match created {
        Ok(event) => event,
        Err(e) => {
            tracing::error!(bot_id = %ctx.bot.id, "Failed to create event: {}", e);
            return ctx.reply_plain(format!("Failed to create event: {}", e)).await;
        }
    };

    let key = event.link_key().to_string();
    let link = deep_link(&ctx.bot_username, &key);
    tracing::info!(bot_id = %ctx.bot.id, event_id = %event.id, slug = %key, "Event created");

    let caption = formatdoc! {"
        ✅ <b>Event Created!</b>

        <b>Name:</b> {name}
        <b>Slug:</b> {key}

        <b>Registration Link:</b>
        <code>{link}</code>

        Leads who scan this will be tagged with source: <code>event:{key}</code>",
        name = escape_html(&event.name),
    };

    match render_png(&link) {
        Ok(png) => {
            ctx.reply_photo(OutgoingFile {
                file_name: format!("{}-qr.png", key),
                bytes: png,
                caption: Some(caption),
            })
            .await
        }
        Err(e) => {
            tracing::warn!(bot_id = %ctx.bot.id, event_id = %event.id, "QR rendering failed: {}", e);
            ctx.reply_html(caption).await
        }
    }
}

pub async fn list_events(ctx: &mut UpdateContext) -> AppResult<()> {
    if !require_admin(ctx).await? {
        return Ok(());
    }

    let events = match ctx.repo().list_events_for_bot(&ctx.bot.id).await {
        Ok(events) => events,
        Err(e) => {
            tracing::error!(bot_id = %ctx.bot.id, "Failed to list events: {}", e);
            return ctx.reply_plain("Failed to fetch events.").await;
        }
    };

    if events.is_empty() {
        return ctx.reply_html(NO_EVENTS_TEXT).await;
    }

    let list = events
        .iter()
        .enumerate()
        .map(|(i, e)| {
            format!(
                "{}. <b>{}</b>\n   <code>{}</code>",
                i + 1,
                escape_html(&e.name),
                deep_link(&ctx.bot_username, e.link_key())
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    ctx.reply_html(format!("📋 <b>Your Events</b>\n\n{}", list)).await
}

pub async fn stats(ctx: &mut UpdateContext) -> AppResult<()> {
    if !require_admin(ctx).await? {
        return Ok(());
    }

    match build_stats(ctx).await {
        Ok(text) => ctx.reply_html(text).await,
        Err(e) => {
            tracing::error!(bot_id = %ctx.bot.id, "Failed to build stats: {}", e);
            ctx.reply_plain("Failed to fetch statistics.").await
        }
    }
}

async fn build_stats(ctx: &UpdateContext) -> AppResult<String> {
    let repo = ctx.repo();
    let total = repo.count_visitors_for_bot(&ctx.bot.id).await?;
    let events = repo.list_events_for_bot(&ctx.bot.id).await?;

    let mut text = format!(
        "📊 <b>Lead Statistics</b>\n\n<b>Total Leads:</b> {}\n<b>Events:</b> {}\n",
        total,
        events.len()
    );

    if !events.is_empty() {
        text.push_str("\n<b>By Event:</b>\n");
        for event in &events {
            let count = repo.count_visitors_for_event(&event.id).await?;
            text.push_str(&format!("• {}: {} leads\n", escape_html(&event.name), count));
        }
    }

    let direct = repo
        .list_visitors_for_bot(&ctx.bot.id)
        .await?
        .iter()
        .filter(|v| v.event_id.is_none() || v.source.as_deref() == Some(DIRECT_SOURCE))
        .count();
    if direct > 0 {
        text.push_str(&format!("• Direct (no event): {} leads\n", direct));
    }

    let tenant_contacts = repo.count_visitors_for_tenant(&ctx.bot.tenant_id).await?;
    if let Some(notice) = billing_message(tenant_contacts) {
        text.push_str(&format!("\n{}\n", notice));
        if tenant_contacts > FREE_CONTACT_LIMIT {
            text.push_str(&format!("Pro plan: ${}/mo\n", pro_cost(tenant_contacts)));
        }
    }

    Ok(text)
}

/// `/export` sends every lead of the bot; `/export <slug>` only one event's
pub async fn export(ctx: &mut UpdateContext, args: &str) -> AppResult<()> {
    if !require_admin(ctx).await? {
        return Ok(());
    }

    let slug = args.split_whitespace().next();
    let visitors = match slug {
        Some(slug) => match ctx.repo().find_event_by_slug(&ctx.bot.id, slug).await {
            Ok(Some(event)) => ctx.repo().list_visitors_for_event(&event.id).await,
            Ok(None) => {
                return ctx
                    .reply_html(format!("Event not found: <code>{}</code>", escape_html(slug)))
                    .await
            }
            Err(e) => Err(e),
        },
        None => ctx.repo().list_visitors_for_bot(&ctx.bot.id).await,
    };

    let visitors = match visitors {
        Ok(visitors) => visitors,
        Err(e) => {
            tracing::error!(bot_id = %ctx.bot.id, "Export failed: {}", e);
            return ctx.reply_plain("Failed to export leads.").await;
        }
    };

    let caption = match slug {
        Some(slug) => format!(
            "📥 <b>Event Leads Exported</b>\n\n{} leads from <code>{}</code>.",
            visitors.len(),
            escape_html(slug)
        ),
        None => "📥 <b>All Leads Exported</b>\n\nThis includes leads from all sources (direct + events).".to_string(),
    };

    let file = OutgoingFile {
        file_name: export_file_name(&ctx.bot.id, Utc::now()),
        bytes: visitors_to_csv(&visitors).into_bytes(),
        caption: Some(caption),
    };
    tracing::info!(bot_id = %ctx.bot.id, rows = visitors.len(), "Leads exported");
    ctx.reply_document(file).await
}

/// Delivery counts of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub sent: u64,
    pub failed: u64,
}

/// Sends `message` to every recipient with at most `concurrency` sends in
/// flight. A failed send is counted and never stops the others.
pub async fn fan_out(
    messenger: &dyn Messenger,
    recipients: &[TelegramId],
    message: &str,
    concurrency: usize,
) -> BroadcastOutcome {
    let results: Vec<bool> = stream::iter(recipients.iter().copied())
        .map(|chat_id| async move {
            match messenger.send_text(chat_id, OutgoingText::plain(message)).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!(chat_id, "Broadcast delivery failed: {}", e);
                    false
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    results.iter().fold(BroadcastOutcome::default(), |mut acc, ok| {
        if *ok {
            acc.sent += 1;
        } else {
            acc.failed += 1;
        }
        acc
    })
}

pub async fn broadcast(ctx: &mut UpdateContext, args: &str) -> AppResult<()> {
    if !require_admin(ctx).await? {
        return Ok(());
    }

    let message = args.trim();
    if message.is_empty() {
        return ctx.reply_html(BROADCAST_USAGE_TEXT).await;
    }

    let visitors = match ctx.repo().list_visitors_for_bot(&ctx.bot.id).await {
        Ok(visitors) => visitors,
        Err(e) => {
            tracing::error!(bot_id = %ctx.bot.id, "Failed to load broadcast recipients: {}", e);
            return ctx.reply_plain("Failed to send broadcast.").await;
        }
    };
    if visitors.is_empty() {
        return ctx.reply_plain(NO_RECIPIENTS_TEXT).await;
    }

    let recipients: Vec<TelegramId> = visitors.iter().map(|v| v.telegram_id).collect();
    let outcome = fan_out(
        ctx.messenger.as_ref(),
        &recipients,
        message,
        config::broadcast::CONCURRENCY,
    )
    .await;

    tracing::info!(
        bot_id = %ctx.bot.id,
        sent = outcome.sent,
        failed = outcome.failed,
        "Broadcast finished"
    );

    if let Err(e) = ctx
        .repo()
        .create_broadcast_log(NewBroadcast {
            bot_id: ctx.bot.id.clone(),
            event_id: ctx.event_id.clone(),
            message: message.to_string(),
            sent_count: outcome.sent,
            failed_count: outcome.failed,
        })
        .await
    {
        tracing::warn!(bot_id = %ctx.bot.id, "Failed to log broadcast: {}", e);
    }

    ctx.reply_html(format!(
        "📢 <b>Broadcast Complete</b>\n\n✅ Sent: {}\n❌ Failed: {}\n📊 Total: {}",
        outcome.sent,
        outcome.failed,
        recipients.len()
    ))
    .await
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use boothcore::error::AppError;
    use pretty_assertions::assert_eq;

    use super::*;

    struct FlakyMessenger {
        failing: HashSet<i64>,
        delivered: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl Messenger for FlakyMessenger {
        async fn send_text(&self, chat_id: i64, _message: OutgoingText) -> AppResult<()> {
            if self.failing.contains(&chat_id) {
                return Err(AppError::Unavailable("blocked by user".into()));
            }
            if let Ok(mut delivered) = self.delivered.lock() {
                delivered.push(chat_id);
            }
            Ok(())
        }
        async fn send_document(&self, _chat_id: i64, _file: OutgoingFile) -> AppResult<()> {
            Ok(())
        }
        async fn send_photo(&self, _chat_id: i64, _file: OutgoingFile) -> AppResult<()> {
            Ok(())
        }
        async fn answer_callback(&self, _callback_id: &str) -> AppResult<()> {
            Ok(())
        }
        async fn set_webhook(&self, _url: &str) -> AppResult<()> {
            Ok(())
        }
        async fn set_commands(&self, _commands: &[(&str, &str)]) -> AppResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_fan_out_isolates_failures() {
        let messenger = FlakyMessenger {
            failing: HashSet::from([2]),
            delivered: Mutex::new(Vec::new()),
        };
        let outcome = fan_out(&messenger, &[1, 2, 3], "hello", 2).await;
        assert_eq!(outcome, BroadcastOutcome { sent: 2, failed: 1 });

        let mut delivered = messenger.delivered.lock().map(|d| d.clone()).unwrap_or_default();
        delivered.sort_unstable();
        assert_eq!(delivered, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_fan_out_with_no_recipients() {
        let messenger = FlakyMessenger {
            failing: HashSet::new(),
            delivered: Mutex::new(Vec::new()),
        };
        assert_eq!(fan_out(&messenger, &[], "hello", 0).await, BroadcastOutcome::default());
    }
}
