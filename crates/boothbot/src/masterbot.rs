//! The platform's own bot: tenant onboarding and dashboard login approval.
//!
//! Organizers message the master bot to connect a BotFather token; the bot
//! stores it, points its webhook at this server and registers the instance.
//! `/start login_<code>` links opened from the dashboard are answered with
//! an approve/deny prompt. `/bug` files a problem report.
//!
//! At most one free-text step is pending per user; any command clears it.

use std::sync::Arc;

use dashmap::DashMap;
use indoc::{formatdoc, indoc};
use teloxide::types::Update;

use boothcore::auth::{find_or_create_tenant, LoginCodeService, TelegramIdentity};
use boothcore::config;
use boothcore::error::AppResult;
use boothcore::events::is_login_payload;
use boothcore::repository::Repository;
use boothcore::types::{NewBot, NewBugReport, TelegramId};
use boothcore::validation::is_valid_bot_token;

use crate::flow::{escape_html, BOT_COMMANDS};
use crate::messenger::{Button, Keyboard, Messenger, OutgoingText};
use crate::middleware::APOLOGY_TEXT;
use crate::registry::BotRegistry;
use crate::update::{Incoming, IncomingKind};

const LOGIN_APPROVE_PREFIX: &str = "login_approve:";
const LOGIN_DENY_PREFIX: &str = "login_deny:";

const WELCOME_TEXT: &str = indoc! {"
    🎪 <b>Welcome to BoothBot!</b>

    Capture leads at crypto conferences with your own branded Telegram bot.

    <b>How it works:</b>
    1️⃣ Create a bot with @BotFather
    2️⃣ Send me the token
    3️⃣ Create events & get QR codes
    4️⃣ Visitors scan → you capture leads!

    💰 <b>Pricing:</b>
    • Free: Up to 25 contacts
    • Pro: $100/mo per 1,000 contacts

    Ready? Use /newbot to get started!"};

const NEW_BOT_TEXT: &str = indoc! {r#"
    🤖 <b>Let's set up your booth bot!</b>

    <b>Step 1:</b> Open @BotFather
    <b>Step 2:</b> Send /newbot
    <b>Step 3:</b> Choose a name (e.g., "ETH Denver Booth")
    <b>Step 4:</b> Choose a username (e.g., ethdenver_booth_bot)
    <b>Step 5:</b> Copy the token and send it here

    ⏳ Waiting for your bot token..."#};

const INVALID_TOKEN_TEXT: &str = indoc! {"
    ❌ That doesn't look like a valid bot token.

    Bot tokens look like:
    <code>123456789:ABCdefGHIjklMNOpqrsTUVwxyz123456789</code>

    Get your token from @BotFather and try again."};

const SETTING_UP_TEXT: &str = "⏳ Setting up your bot...";
const ALREADY_CONNECTED_TEXT: &str = "This bot is already connected. Message it directly and use /admin to manage it.";
const NO_BOTS_TEXT: &str = "You don't have any bots yet. Use /newbot to create one!";

const HELP_TEXT: &str = indoc! {"
    📚 <b>BoothBot Commands</b>

    /start - Welcome message
    /newbot - Create a new booth bot
    /mybots - List your bots
    /bug - Report a problem
    /help - Show this message

    💰 <b>Pricing:</b>
    • Free: Up to 25 contacts
    • Pro: $100/mo per 1,000 contacts"};

const BUG_PROMPT_TEXT: &str = indoc! {"
    🐛 <b>Report a Bug</b>

    Please describe the issue you encountered:

    <i>Include what you were doing, what you expected, and what happened instead.</i>"};

const BUG_SUBMITTED_TEXT: &str = indoc! {"
    ✅ <b>Bug Report Submitted</b>

    Thank you for helping us improve BoothBot!

    Your report has been logged and we'll look into it."};

const BUG_TOO_SHORT_TEXT: &str = "Please provide a more detailed description (at least 5 characters).";
const BUG_FAILED_TEXT: &str = "❌ Failed to submit bug report. Please try again later.";
const MIN_BUG_REPORT_CHARS: usize = 5;

const LOGIN_PROMPT_TEXT: &str = "🔐 <b>Dashboard login requested</b>\n\nSomeone is signing in to the BoothBot dashboard with your Telegram account. Was it you?";
const LOGIN_APPROVED_TEXT: &str = "✅ Login approved! Return to the dashboard, you're signed in.";
const LOGIN_DENIED_TEXT: &str = "🚫 Login denied. The dashboard session was not signed in.";
const LOGIN_INVALID_TEXT: &str = "❌ This login link is invalid or has expired. Please request a new one from the dashboard.";
const LOGIN_DISABLED_TEXT: &str = "Dashboard login is not enabled on this server.";

/// Free-text step a user owes the master bot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    BotToken,
    BugReport,
}

pub struct MasterBot {
    messenger: Arc<dyn Messenger>,
    repo: Arc<dyn Repository>,
    registry: Arc<BotRegistry>,
    login: Option<Arc<LoginCodeService>>,
    base_url: Option<String>,
    pending: DashMap<TelegramId, Pending>,
}

impl MasterBot {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        repo: Arc<dyn Repository>,
        registry: Arc<BotRegistry>,
        login: Option<Arc<LoginCodeService>>,
        base_url: Option<String>,
    ) -> Self {
        Self {
            messenger,
            repo,
            registry,
            login,
            base_url,
            pending: DashMap::new(),
        }
    }

    /// Handles one master-bot update; failures are logged and answered
    pub async fn handle_update(&self, update: &Update) {
        let Some(incoming) = Incoming::from_update(update) else {
            return;
        };
        if let Err(e) = self.dispatch(&incoming).await {
            tracing::error!(user_id = incoming.sender.id, "Master bot update failed: {}", e);
            if let Err(e) = self.messenger.send_text(incoming.chat_id, OutgoingText::plain(APOLOGY_TEXT)).await {
                tracing::warn!(user_id = incoming.sender.id, "Failed to send apology: {}", e);
            }
        }
    }

    async fn dispatch(&self, incoming: &Incoming) -> AppResult<()> {
        match &incoming.kind {
            IncomingKind::Command { name, args } => {
                if let Some((_, abandoned)) = self.pending.remove(&incoming.sender.id) {
                    tracing::debug!(user_id = incoming.sender.id, ?abandoned, command = %name, "Pending step abandoned");
                }
                self.command(incoming, name, args).await
            }
            IncomingKind::Callback { id, data } => {
                if let Err(e) = self.messenger.answer_callback(id).await {
                    tracing::debug!("Failed to answer callback query: {}", e);
                }
                self.login_decision(incoming, data).await
            }
            IncomingKind::Text(text) => {
                let pending = self.pending.get(&incoming.sender.id).map(|p| *p);
                match pending {
                    Some(Pending::BotToken) => self.connect_bot(incoming, text.trim()).await,
                    Some(Pending::BugReport) => self.bug_report_text(incoming, text.trim()).await,
                    None => Ok(()),
                }
            }
        }
    }

    async fn command(&self, incoming: &Incoming, name: &str, args: &str) -> AppResult<()> {
        match name {
            "start" => match incoming.start_payload() {
                Some(payload) if is_login_payload(payload) => {
                    let code = payload.trim_start_matches(config::auth::LOGIN_PAYLOAD_PREFIX);
                    self.login_prompt(incoming, code).await
                }
                _ => self.start(incoming).await,
            },
            "newbot" => {
                self.pending.insert(incoming.sender.id, Pending::BotToken);
                self.reply(incoming, OutgoingText::html(NEW_BOT_TEXT)).await
            }
            "mybots" => self.my_bots(incoming).await,
            "bug" => {
                let report = args.trim();
                if report.chars().count() > MIN_BUG_REPORT_CHARS {
                    return self.submit_bug_report(incoming, report).await;
                }
                self.pending.insert(incoming.sender.id, Pending::BugReport);
                self.reply(incoming, OutgoingText::html(BUG_PROMPT_TEXT)).await
            }
            "help" => self.reply(incoming, OutgoingText::html(HELP_TEXT)).await,
            _ => Ok(()),
        }
    }

    async fn reply(&self, incoming: &Incoming, message: OutgoingText) -> AppResult<()> {
        self.messenger.send_text(incoming.chat_id, message).await
    }

    async fn start(&self, incoming: &Incoming) -> AppResult<()> {
        let Some(tenant) = self.repo.find_tenant_by_telegram_id(incoming.sender.id).await? else {
            return self.reply(incoming, OutgoingText::html(WELCOME_TEXT)).await;
        };
        let bots = self.repo.list_bots_for_tenant(&tenant.id).await?;
        let text = formatdoc! {"
            👋 Welcome back to BoothBot!

            You have {count} booth bot(s) set up.

            Commands:
            /newbot - Create a new booth bot
            /mybots - List your bots
            /help - Show all commands",
            count = bots.len(),
        };
        self.reply(incoming, OutgoingText::html(text)).await
    }

    async fn my_bots(&self, incoming: &Incoming) -> AppResult<()> {
        let bots = match self.repo.find_tenant_by_telegram_id(incoming.sender.id).await? {
            Some(tenant) => self.repo.list_bots_for_tenant(&tenant.id).await?,
            None => Vec::new(),
        };
        if bots.is_empty() {
            return self.reply(incoming, OutgoingText::plain(NO_BOTS_TEXT)).await;
        }

        let list = bots
            .iter()
            .enumerate()
            .map(|(i, b)| format!("{}. @{}", i + 1, escape_html(&b.username)))
            .collect::<Vec<_>>()
            .join("\n");
        let text = format!(
            "📋 <b>Your Booth Bots:</b>\n\n{}\n\nTo manage a bot, message it directly and use /admin",
            list
        );
        self.reply(incoming, OutgoingText::html(text)).await
    }

    /// Token received after `/newbot`: validate, connect, persist, point the
    /// webhook here and register the instance.
    async fn connect_bot(&self, incoming: &Incoming, token: &str) -> AppResult<()> {
        if !is_valid_bot_token(token) {
            return self.reply(incoming, OutgoingText::html(INVALID_TOKEN_TEXT)).await;
        }
        self.pending.remove(&incoming.sender.id);
        self.reply(incoming, OutgoingText::plain(SETTING_UP_TEXT)).await?;

        if self.repo.find_bot_by_token(token).await?.is_some() {
            return self.reply(incoming, OutgoingText::plain(ALREADY_CONNECTED_TEXT)).await;
        }

        let client = match self.registry.factory().connect(token).await {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(user_id = incoming.sender.id, "Bot token rejected: {}", e);
                return self.reply(incoming, OutgoingText::html(setup_failed_text(&e.to_string()))).await;
            }
        };

        let sender = &incoming.sender;
        let tenant = find_or_create_tenant(
            self.repo.as_ref(),
            TelegramIdentity {
                telegram_id: sender.id,
                username: sender.username.clone(),
                first_name: Some(sender.first_name.clone()),
            },
        )
        .await?;

        let record = self
            .repo
            .create_bot(NewBot {
                tenant_id: tenant.id.clone(),
                token: token.to_string(),
                username: client.username.clone(),
                owner_telegram_id: Some(sender.id),
            })
            .await?;

        match self.base_url.as_deref() {
            Some(base) => {
                let url = format!("{}/webhook/{}", base, record.id);
                if let Err(e) = client.messenger.set_webhook(&url).await {
                    tracing::warn!(bot_id = %record.id, "Failed to set webhook: {}", e);
                }
            }
            None => tracing::warn!(bot_id = %record.id, "BASE_URL not set, webhook not registered"),
        }
        if let Err(e) = client.messenger.set_commands(BOT_COMMANDS).await {
            tracing::warn!(bot_id = %record.id, "Failed to publish commands: {}", e);
        }

        let username = client.username.clone();
        self.registry.install(record.clone(), client);
        tracing::info!(bot_id = %record.id, tenant_id = %tenant.id, username = %username, "Tenant bot connected");

        let text = formatdoc! {"
            ✅ <b>Success!</b>

            Your booth bot @{username} is ready!

            <b>What's configured:</b>
            • Bot commands
            • Webhook for real-time updates

            <b>Next steps:</b>
            1️⃣ Open @{username}
            2️⃣ Send /admin to access admin commands
            3️⃣ Create your first event with /newevent

            🎁 <b>Free tier:</b> Up to 25 contacts included!",
            username = escape_html(&username),
        };
        self.reply(incoming, OutgoingText::html(text)).await
    }

    async fn bug_report_text(&self, incoming: &Incoming, report: &str) -> AppResult<()> {
        if report.chars().count() < MIN_BUG_REPORT_CHARS {
            return self.reply(incoming, OutgoingText::plain(BUG_TOO_SHORT_TEXT)).await;
        }
        self.submit_bug_report(incoming, report).await
    }

    /// Stores the report; the pending step ends whether or not it saved
    async fn submit_bug_report(&self, incoming: &Incoming, report: &str) -> AppResult<()> {
        self.pending.remove(&incoming.sender.id);
        let saved = self
            .repo
            .create_bug_report(NewBugReport {
                telegram_id: incoming.sender.id,
                username: incoming.sender.username.clone(),
                report: report.to_string(),
            })
            .await;

        match saved {
            Ok(record) => {
                tracing::info!(user_id = incoming.sender.id, report_id = %record.id, "Bug report submitted");
                self.reply(incoming, OutgoingText::html(BUG_SUBMITTED_TEXT)).await
            }
            Err(e) => {
                tracing::error!(user_id = incoming.sender.id, "Failed to store bug report: {}", e);
                self.reply(incoming, OutgoingText::plain(BUG_FAILED_TEXT)).await
            }
        }
    }

    async fn login_prompt(&self, incoming: &Incoming, code: &str) -> AppResult<()> {
        if self.login.is_none() {
            return self.reply(incoming, OutgoingText::plain(LOGIN_DISABLED_TEXT)).await;
        }
        let keyboard = Keyboard::default().row(vec![
            Button::new("✅ Approve", format!("{}{}", LOGIN_APPROVE_PREFIX, code)),
            Button::new("❌ Deny", format!("{}{}", LOGIN_DENY_PREFIX, code)),
        ]);
        self.reply(incoming, OutgoingText::html(LOGIN_PROMPT_TEXT).with_keyboard(keyboard))
            .await
    }

    async fn login_decision(&self, incoming: &Incoming, data: &str) -> AppResult<()> {
        let Some(login) = self.login.as_ref() else {
            return Ok(());
        };
        let who = TelegramIdentity {
            telegram_id: incoming.sender.id,
            username: incoming.sender.username.clone(),
            first_name: Some(incoming.sender.first_name.clone()),
        };

        let (resolved, reply) = if let Some(code) = data.strip_prefix(LOGIN_APPROVE_PREFIX) {
            (login.approve(code, who).await?, LOGIN_APPROVED_TEXT)
        } else if let Some(code) = data.strip_prefix(LOGIN_DENY_PREFIX) {
            (login.deny(code, who).await?, LOGIN_DENIED_TEXT)
        } else {
            return Ok(());
        };

        tracing::info!(user_id = incoming.sender.id, resolved, "Login code decision");
        let text = if resolved { reply } else { LOGIN_INVALID_TEXT };
        self.reply(incoming, OutgoingText::plain(text)).await
    }
}

fn setup_failed_text(error: &str) -> String {
    formatdoc! {"
        ❌ <b>Setup failed</b>

        Error: {error}

        Make sure:
        • The token is correct
        • You're the owner of the bot
        • The bot hasn't been deleted

        Try again with /newbot",
        error = escape_html(error),
    }
}
