//! Visitor registration dialogue.
//!
//! Primary path: name, company, title, email, then save. `back_to_confirm`
//! opens the summary from any step once a name is known. From there the
//! edit menu either revisits a primary field and returns to the summary, or
//! enters the phone, wallet, notes chain which runs forward to the summary.
//! Every handler re-checks the session state it owns, so duplicate or
//! reordered deliveries fall through silently.

use boothcore::error::AppResult;
use boothcore::session::{ConversationState, Field};
use boothcore::types::{NewVisitor, DIRECT_SOURCE};
use boothcore::validation::{is_valid_email, is_valid_phone, is_valid_wallet_address};

use super::escape_html;
use crate::context::UpdateContext;
use crate::keyboards::{
    confirm_keyboard, edit_fields_keyboard, skip_keyboard, BACK_TO_CONFIRM, CONFIRM_REGISTRATION, EDIT_PREFIX,
    EDIT_REGISTRATION, REGISTER_VISITOR, SKIP_PREFIX,
};
use crate::messenger::OutgoingText;

pub const WELCOME_TEXT: &str =
    "👋 <b>Welcome!</b>\n\nLet's get you registered — it only takes a moment.\n\n<b>What's your name?</b>";
pub const REGISTER_TEXT: &str = "👋 <b>Let's get you registered!</b>\n\n<b>What's your name?</b>";
pub const ALREADY_REGISTERED_TEXT: &str = "✅ <b>You're already registered!</b>\n\nThank you for your interest. We'll keep you updated on event news and announcements.\n\n<i>Powered by Moongate 🌙</i>";
pub const THANK_YOU_TEXT: &str = "🎉 <b>You're all set!</b>\n\nThank you for stopping by! We'll be in touch with updates and exclusive content.\n\n🎁 <b>Don't forget to grab your merch at our booth!</b>\n\nSee you around! 👋\n\n<i>Powered by Moongate 🌙</i>";
pub const SESSION_LOST_TEXT: &str = "⚠️ Your session expired. Please start over with /start";
pub const SAVE_FAILED_TEXT: &str = "❌ Sorry, we couldn't save your registration. Please try again.";

const EMPTY_NAME_TEXT: &str = "Please enter your name.\n\n<b>What's your name?</b>";
const NAME_PROMPT: &str = "<b>What's your name?</b>";
const COMPANY_PROMPT: &str = "<b>What company or project are you with?</b>";
const TITLE_PROMPT: &str = "<b>What's your role or title?</b>\n\n<i>e.g., Developer, Founder, Marketing, Investor...</i>";
const EMAIL_PROMPT: &str = "<b>What's your email?</b>\n\n<i>We'll use this for follow-ups and important updates.</i>";
const INVALID_EMAIL_TEXT: &str = "That doesn't look like a valid email. Try again or skip.\n\n<b>What's your email?</b>";
const PHONE_PROMPT: &str = "What's your phone number?";
const INVALID_PHONE_TEXT: &str = "Please provide a valid phone number.";
const WALLET_PROMPT: &str = "What's your wallet address? (Ethereum or Solana)";
const INVALID_WALLET_TEXT: &str = "Please provide a valid Ethereum or Solana wallet address.";
const NOTES_PROMPT: &str = "Any additional notes or interests?";
const EDIT_MENU_TEXT: &str = "What would you like to edit?";

/// `/start`: known visitors are told they're registered, everyone else
/// starts collection at the name step.
pub async fn start(ctx: &mut UpdateContext) -> AppResult<()> {
    match ctx
        .repo()
        .find_visitor_by_bot_and_user(&ctx.bot.id, ctx.user_id())
        .await
    {
        Ok(Some(_)) => {
            tracing::debug!(bot_id = %ctx.bot.id, user_id = ctx.user_id(), "Visitor already registered");
            return ctx.reply_html(ALREADY_REGISTERED_TEXT).await;
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(bot_id = %ctx.bot.id, user_id = ctx.user_id(), "Visitor lookup failed: {}", e);
        }
    }

    begin_collection(ctx);
    tracing::info!(
        bot_id = %ctx.bot.id,
        user_id = ctx.user_id(),
        event_id = ctx.event_id.as_deref().unwrap_or("-"),
        "Registration started"
    );
    ctx.reply_html(WELCOME_TEXT).await
}

fn begin_collection(ctx: &mut UpdateContext) {
    ctx.session.reset();
    ctx.session.state = ConversationState::CollectingName;
}

/// Inline-button presses
pub async fn callback(ctx: &mut UpdateContext, data: &str) -> AppResult<()> {
    match data {
        REGISTER_VISITOR => {
            begin_collection(ctx);
            ctx.reply_html(REGISTER_TEXT).await
        }
        CONFIRM_REGISTRATION => {
            if ctx.session.state != ConversationState::Confirming {
                return Ok(());
            }
            save_and_thank(ctx).await
        }
        EDIT_REGISTRATION => {
            if ctx.session.state != ConversationState::Confirming {
                return Ok(());
            }
            ctx.reply(OutgoingText::plain(EDIT_MENU_TEXT).with_keyboard(edit_fields_keyboard()))
                .await
        }
        BACK_TO_CONFIRM => {
            let collecting_named = ctx.session.state.collected_field().is_some()
                && ctx.session.visitor_data.full_name.is_some();
            if ctx.session.state != ConversationState::Confirming
                && ctx.session.editing.is_none()
                && !collecting_named
            {
                return Ok(());
            }
            ctx.session.editing = None;
            show_confirmation(ctx).await
        }
        _ => {
            if let Some(field) = data.strip_prefix(SKIP_PREFIX).and_then(|f| f.parse::<Field>().ok()) {
                return skip(ctx, field).await;
            }
            if let Some(field) = data.strip_prefix(EDIT_PREFIX).and_then(|f| f.parse::<Field>().ok()) {
                return edit(ctx, field).await;
            }
            tracing::debug!(bot_id = %ctx.bot.id, data, "Ignoring unknown callback");
            Ok(())
        }
    }
}

/// Free text while collecting a field
pub async fn text_input(ctx: &mut UpdateContext, text: &str) -> AppResult<()> {
    let Some(field) = ctx.session.state.collected_field() else {
        return Ok(());
    };
    let value = text.trim();

    match field {
        Field::FullName if value.is_empty() => return ctx.reply_html(EMPTY_NAME_TEXT).await,
        Field::Email if !value.is_empty() && !is_valid_email(value) => {
            tracing::debug!(bot_id = %ctx.bot.id, user_id = ctx.user_id(), "Rejected email input");
            return ctx.reply(email_prompt(INVALID_EMAIL_TEXT)).await;
        }
        Field::Phone if !is_valid_phone(value) => return ctx.reply_plain(INVALID_PHONE_TEXT).await,
        Field::WalletAddress if !is_valid_wallet_address(value) => return ctx.reply_plain(INVALID_WALLET_TEXT).await,
        _ => {}
    }

    if !value.is_empty() {
        ctx.session.visitor_data.set(field, value.to_string());
    }
    advance(ctx, field).await
}

async fn skip(ctx: &mut UpdateContext, field: Field) -> AppResult<()> {
    if ctx.session.state != field.collecting_state() {
        return Ok(());
    }
    advance(ctx, field).await
}

async fn edit(ctx: &mut UpdateContext, field: Field) -> AppResult<()> {
    if ctx.session.state != ConversationState::Confirming {
        return Ok(());
    }
    ctx.session.editing = (!in_optional_chain(field)).then_some(field);
    ctx.session.state = field.collecting_state();
    ctx.reply(field_prompt(field, None)).await
}

/// Phone, wallet and notes are collected as a chain ending at the summary
fn in_optional_chain(field: Field) -> bool {
    matches!(field, Field::Phone | Field::WalletAddress | Field::Notes)
}

/// Moves past `field`: back to the summary when editing, otherwise to the
/// next step.
async fn advance(ctx: &mut UpdateContext, field: Field) -> AppResult<()> {
    if ctx.session.editing.take().is_some() {
        return show_confirmation(ctx).await;
    }

    let next = match field {
        Field::FullName => Field::Company,
        Field::Company => Field::Title,
        Field::Title => Field::Email,
        Field::Email => return save_and_thank(ctx).await,
        Field::Phone => Field::WalletAddress,
        Field::WalletAddress => Field::Notes,
        Field::Notes => return show_confirmation(ctx).await,
    };

    ctx.session.state = next.collecting_state();
    let name = ctx.session.visitor_data.full_name.clone();
    ctx.reply(field_prompt(next, name.as_deref())).await
}

fn email_prompt(text: &str) -> OutgoingText {
    OutgoingText::html(text).with_keyboard(skip_keyboard(Field::Email))
}

fn field_prompt(field: Field, name: Option<&str>) -> OutgoingText {
    match field {
        Field::FullName => OutgoingText::html(NAME_PROMPT),
        Field::Company => {
            let text = match name {
                Some(name) => format!("Nice to meet you, <b>{}</b>! 👋\n\n{}", escape_html(name), COMPANY_PROMPT),
                None => COMPANY_PROMPT.to_string(),
            };
            OutgoingText::html(text).with_keyboard(skip_keyboard(Field::Company))
        }
        Field::Title => OutgoingText::html(TITLE_PROMPT).with_keyboard(skip_keyboard(Field::Title)),
        Field::Email => email_prompt(EMAIL_PROMPT),
        Field::Phone => OutgoingText::plain(PHONE_PROMPT).with_keyboard(skip_keyboard(Field::Phone)),
        Field::WalletAddress => OutgoingText::plain(WALLET_PROMPT).with_keyboard(skip_keyboard(Field::WalletAddress)),
        Field::Notes => OutgoingText::plain(NOTES_PROMPT).with_keyboard(skip_keyboard(Field::Notes)),
    }
}

async fn show_confirmation(ctx: &mut UpdateContext) -> AppResult<()> {
    ctx.session.state = ConversationState::Confirming;
    let text = confirmation_summary(ctx);
    ctx.reply(OutgoingText::html(text).with_keyboard(confirm_keyboard())).await
}

fn confirmation_summary(ctx: &UpdateContext) -> String {
    let data = &ctx.session.visitor_data;
    let show = |v: &Option<String>| v.as_deref().map(escape_html).unwrap_or_else(|| "Not provided".to_string());

    let mut text = format!(
        "✅ <b>Please confirm your details:</b>\n\n<b>Name:</b> {}\n<b>Company:</b> {}\n<b>Role:</b> {}\n<b>Email:</b> {}",
        show(&data.full_name),
        show(&data.company),
        show(&data.title),
        show(&data.email),
    );
    for (label, value) in [("Phone", &data.phone), ("Wallet", &data.wallet_address), ("Notes", &data.notes)] {
        if let Some(value) = value {
            text.push_str(&format!("\n<b>{}:</b> {}", label, escape_html(value)));
        }
    }
    text.push_str("\n\n<i>Powered by Moongate 🌙</i>");
    text
}

/// Terminal action: upsert the lead, thank the visitor, reset the session.
/// A failed save is reported and the state is left as it was so the
/// visitor can retry.
async fn save_and_thank(ctx: &mut UpdateContext) -> AppResult<()> {
    let Some(full_name) = ctx.session.visitor_data.full_name.clone() else {
        tracing::info!(bot_id = %ctx.bot.id, user_id = ctx.user_id(), "Session lost before save");
        ctx.session.reset();
        return ctx.reply_plain(SESSION_LOST_TEXT).await;
    };

    let event_id = resolve_event_id(ctx).await;
    let data = ctx.session.visitor_data.clone();
    let visitor = NewVisitor {
        bot_id: ctx.bot.id.clone(),
        event_id: event_id.clone(),
        source: Some(ctx.session.source.clone().unwrap_or_else(|| DIRECT_SOURCE.to_string())),
        telegram_id: ctx.user_id(),
        telegram_username: ctx.incoming.sender.username.clone(),
        full_name: Some(full_name),
        company: data.company,
        title: data.title,
        email: data.email,
        phone: data.phone,
        wallet_address: data.wallet_address,
        notes: data.notes,
    };

    match ctx.repo().upsert_visitor(visitor).await {
        Ok(saved) => {
            tracing::info!(
                bot_id = %ctx.bot.id,
                user_id = ctx.user_id(),
                visitor_id = %saved.id,
                event_id = event_id.as_deref().unwrap_or("-"),
                "Visitor registered"
            );
            ctx.session.reset();
            ctx.reply_html(THANK_YOU_TEXT).await
        }
        Err(e) => {
            tracing::error!(bot_id = %ctx.bot.id, user_id = ctx.user_id(), "Failed to save visitor: {}", e);
            ctx.reply_plain(SAVE_FAILED_TEXT).await
        }
    }
}

/// The event id in effect, re-resolved by slug when only a slug is cached
async fn resolve_event_id(ctx: &UpdateContext) -> Option<String> {
    if let Some(id) = ctx.event_id.clone().or_else(|| ctx.session.event_id.clone()) {
        return Some(id);
    }
    let slug = ctx.session.event_slug.as_deref()?;
    match ctx.repo().find_event_by_slug(&ctx.bot.id, slug).await {
        Ok(event) => event.map(|e| e.id),
        Err(e) => {
            tracing::warn!(bot_id = %ctx.bot.id, slug, "Event re-resolution failed: {}", e);
            None
        }
    }
}
