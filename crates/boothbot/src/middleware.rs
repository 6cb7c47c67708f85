//! The per-update pipeline.
//!
//! Stages run in a fixed order: error containment (outermost), session
//! load, event-context resolution, billing gate, dispatch, session save.
//! The session is saved whenever the inner stages finished, including when
//! they failed or panicked, since containment has already handled those.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;

use boothcore::error::AppResult;
use boothcore::types::BotRecord;

use crate::context::{Services, UpdateContext};
use crate::flow;
use crate::messenger::Messenger;
use crate::update::Incoming;

pub const APOLOGY_TEXT: &str = "An error occurred. Please try again or contact support.";

pub const LIMIT_REACHED_TEXT: &str =
    "⚠️ This bot has reached its free plan limit and is not accepting new registrations right now. Please check back later.";

/// Runs one normalized update through the whole pipeline. Never fails:
/// errors and panics are logged and answered with an apology.
pub async fn process_update(
    bot: &BotRecord,
    bot_username: &str,
    messenger: Arc<dyn Messenger>,
    services: Arc<Services>,
    incoming: Incoming,
) {
    let user_id = incoming.sender.id;
    let session = services.sessions.get(&bot.id, user_id).await;

    let mut ctx = UpdateContext {
        bot: bot.clone(),
        bot_username: bot_username.to_string(),
        messenger,
        services,
        incoming,
        session,
        event_id: None,
    };

    let outcome = AssertUnwindSafe(run_stages(&mut ctx)).catch_unwind().await;
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(bot_id = %ctx.bot.id, user_id, "Update handling failed: {}", e);
            apologize(&ctx).await;
        }
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(bot_id = %ctx.bot.id, user_id, "Update handler panicked: {}", reason);
            apologize(&ctx).await;
        }
    }

    ctx.services
        .sessions
        .set(&ctx.bot.id, user_id, ctx.session.clone())
        .await;
}

async fn apologize(ctx: &UpdateContext) {
    if let Err(e) = ctx.reply_plain(APOLOGY_TEXT).await {
        tracing::warn!(bot_id = %ctx.bot.id, user_id = ctx.user_id(), "Failed to send apology: {}", e);
    }
}

async fn run_stages(ctx: &mut UpdateContext) -> AppResult<()> {
    resolve_event(ctx).await;
    if !billing_gate(ctx).await? {
        return Ok(());
    }
    flow::dispatch(ctx).await
}

/// `/start` may carry a deep-link payload; every other update keeps the
/// event already stored on the session.
async fn resolve_event(ctx: &mut UpdateContext) {
    ctx.event_id = if ctx.incoming.is_start() {
        let payload = ctx.incoming.start_payload().map(str::to_string);
        ctx.services
            .events
            .apply(&ctx.bot.id, payload.as_deref(), &mut ctx.session)
            .await
    } else {
        ctx.session.event_id.clone()
    };
}

/// Returns whether dispatch may run. A failing billing check lets the
/// update through.
async fn billing_gate(ctx: &UpdateContext) -> AppResult<bool> {
    match ctx.services.billing.check_limits(&ctx.bot.id).await {
        Ok(status) if status.within_limits => Ok(true),
        Ok(status) => {
            tracing::info!(
                bot_id = %ctx.bot.id,
                user_id = ctx.user_id(),
                contacts = status.contact_count,
                age_days = status.age_days,
                "Tenant over limit, update not dispatched"
            );
            ctx.reply_plain(LIMIT_REACHED_TEXT).await?;
            Ok(false)
        }
        Err(e) => {
            tracing::warn!(bot_id = %ctx.bot.id, "Billing check failed, letting update through: {}", e);
            Ok(true)
        }
    }
}
