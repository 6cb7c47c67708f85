//! Routes a normalized update to the visitor flow or the admin dispatcher.

pub mod admin;
pub mod visitor;

use boothcore::error::AppResult;
use boothcore::session::ConversationState;

use crate::context::UpdateContext;
use crate::update::IncomingKind;

/// Commands published to every tenant bot's menu
pub const BOT_COMMANDS: &[(&str, &str)] = &[
    ("start", "Register or restart"),
    ("help", "Show help"),
    ("admin", "Admin panel"),
    ("newevent", "Create a new event"),
    ("events", "List your events"),
    ("stats", "Lead statistics"),
    ("export", "Export leads as CSV"),
    ("broadcast", "Message all leads"),
];

pub async fn dispatch(ctx: &mut UpdateContext) -> AppResult<()> {
    match ctx.incoming.kind.clone() {
        IncomingKind::Command { name, args } => match name.as_str() {
            "start" => visitor::start(ctx).await,
            "help" => admin::help(ctx).await,
            "admin" => admin::panel(ctx).await,
            "newevent" => admin::new_event(ctx).await,
            "events" => admin::list_events(ctx).await,
            "stats" => admin::stats(ctx).await,
            "export" => admin::export(ctx, &args).await,
            "broadcast" => admin::broadcast(ctx, &args).await,
            other => {
                tracing::debug!(bot_id = %ctx.bot.id, command = other, "Ignoring unknown command");
                Ok(())
            }
        },
        IncomingKind::Callback { id, data } => {
            ctx.answer_callback(&id).await;
            visitor::callback(ctx, &data).await
        }
        IncomingKind::Text(text) => match ctx.session.state {
            ConversationState::CreatingEvent => admin::event_name_input(ctx, &text).await,
            ConversationState::CreatingEventSlug => admin::event_slug_input(ctx, &text).await,
            ConversationState::Idle | ConversationState::Confirming => Ok(()),
            _ => visitor::text_input(ctx, &text).await,
        },
    }
}

/// Escapes user-supplied text for HTML parse mode
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
