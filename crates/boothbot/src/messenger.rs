//! Outbound messaging seam.
//!
//! Flows talk to Telegram only through [`Messenger`]; the production
//! implementation wraps a teloxide [`Bot`], tests substitute a recorder.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::ClientBuilder;
use teloxide::prelude::*;
use teloxide::types::{BotCommand, CallbackQueryId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode};

use boothcore::config;
use boothcore::error::{AppError, AppResult};

/// Inline keyboard button carrying callback data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub text: String,
    pub data: String,
}

impl Button {
    pub fn new(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        self.rows.push(buttons);
        self
    }

    /// Every callback payload on the keyboard, row by row
    pub fn callback_data(&self) -> Vec<&str> {
        self.rows.iter().flatten().map(|b| b.data.as_str()).collect()
    }
}

impl From<&Keyboard> for InlineKeyboardMarkup {
    fn from(keyboard: &Keyboard) -> Self {
        InlineKeyboardMarkup::new(keyboard.rows.iter().map(|row| {
            row.iter()
                .map(|b| InlineKeyboardButton::callback(b.text.clone(), b.data.clone()))
                .collect::<Vec<_>>()
        }))
    }
}

/// An outgoing text message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingText {
    pub text: String,
    pub html: bool,
    pub keyboard: Option<Keyboard>,
}

impl OutgoingText {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            html: false,
            keyboard: None,
        }
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            html: true,
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

/// An outgoing file (document or photo) with an optional HTML caption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub caption: Option<String>,
}

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, chat_id: i64, message: OutgoingText) -> AppResult<()>;
    async fn send_document(&self, chat_id: i64, file: OutgoingFile) -> AppResult<()>;
    async fn send_photo(&self, chat_id: i64, file: OutgoingFile) -> AppResult<()>;
    async fn answer_callback(&self, callback_id: &str) -> AppResult<()>;
    async fn set_webhook(&self, url: &str) -> AppResult<()>;
    async fn set_commands(&self, commands: &[(&str, &str)]) -> AppResult<()>;
}

/// A connected client: its messenger and the username `getMe` reported
#[derive(Clone)]
pub struct BotClient {
    pub messenger: Arc<dyn Messenger>,
    pub username: String,
}

/// Builds connected clients from bot tokens
#[async_trait]
pub trait BotClientFactory: Send + Sync {
    async fn connect(&self, token: &str) -> AppResult<BotClient>;
}

/// [`Messenger`] over the Telegram Bot API
pub struct TeloxideMessenger {
    bot: Bot,
}

impl TeloxideMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

/// Creates a teloxide bot for `token` with the network timeout applied and,
/// when configured, a custom Bot API server.
pub fn create_bot(token: &str, api_url: Option<&url::Url>) -> AppResult<Bot> {
    let client = ClientBuilder::new()
        .timeout(config::network::timeout())
        .build()
        .map_err(|e| AppError::Unavailable(format!("HTTP client: {}", e)))?;
    let bot = Bot::with_client(token, client);
    Ok(match api_url {
        Some(url) => bot.set_api_url(url.clone()),
        None => bot,
    })
}

#[async_trait]
impl Messenger for TeloxideMessenger {
    async fn send_text(&self, chat_id: i64, message: OutgoingText) -> AppResult<()> {
        let mut request = self.bot.send_message(ChatId(chat_id), message.text);
        if message.html {
            request = request.parse_mode(ParseMode::Html);
        }
        if let Some(keyboard) = message.keyboard.as_ref() {
            request = request.reply_markup(InlineKeyboardMarkup::from(keyboard));
        }
        request.await?;
        Ok(())
    }

    async fn send_document(&self, chat_id: i64, file: OutgoingFile) -> AppResult<()> {
        let mut request = self
            .bot
            .send_document(ChatId(chat_id), InputFile::memory(file.bytes).file_name(file.file_name));
        if let Some(caption) = file.caption {
            request = request.caption(caption).parse_mode(ParseMode::Html);
        }
        request.await?;
        Ok(())
    }

    async fn send_photo(&self, chat_id: i64, file: OutgoingFile) -> AppResult<()> {
        let mut request = self
            .bot
            .send_photo(ChatId(chat_id), InputFile::memory(file.bytes).file_name(file.file_name));
        if let Some(caption) = file.caption {
            request = request.caption(caption).parse_mode(ParseMode::Html);
        }
        request.await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> AppResult<()> {
        self.bot
            .answer_callback_query(CallbackQueryId(callback_id.to_string()))
            .await?;
        Ok(())
    }

    async fn set_webhook(&self, url: &str) -> AppResult<()> {
        let url = url::Url::parse(url).map_err(|e| AppError::Validation(format!("webhook URL: {}", e)))?;
        self.bot.set_webhook(url).await?;
        Ok(())
    }

    async fn set_commands(&self, commands: &[(&str, &str)]) -> AppResult<()> {
        self.bot
            .set_my_commands(commands.iter().map(|(name, description)| BotCommand::new(*name, *description)))
            .await?;
        Ok(())
    }
}

/// Connects real bots: builds the client and resolves its username
pub struct TeloxideFactory {
    api_url: Option<url::Url>,
}

impl TeloxideFactory {
    pub fn new(api_url: Option<url::Url>) -> Self {
        Self { api_url }
    }

    /// Honours `BOT_API_URL` when it parses
    pub fn from_config() -> Self {
        let api_url = config::BOT_API_URL.as_deref().and_then(|raw| match url::Url::parse(raw) {
            Ok(url) => {
                tracing::info!("Using custom Bot API URL: {}", url);
                Some(url)
            }
            Err(e) => {
                tracing::warn!("Ignoring invalid BOT_API_URL {}: {}", raw, e);
                None
            }
        });
        Self::new(api_url)
    }
}

#[async_trait]
impl BotClientFactory for TeloxideFactory {
    async fn connect(&self, token: &str) -> AppResult<BotClient> {
        let bot = create_bot(token, self.api_url.as_ref())?;
        let me = bot.get_me().await?;
        let username = me.user.username.clone().unwrap_or_default();
        Ok(BotClient {
            messenger: Arc::new(TeloxideMessenger::new(bot)),
            username,
        })
    }
}
