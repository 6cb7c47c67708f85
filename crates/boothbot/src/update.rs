//! Normalized view of the Telegram updates the engine reacts to.

use teloxide::types::{Update, UpdateKind, User};

use boothcore::types::TelegramId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: TelegramId,
    pub username: Option<String>,
    pub first_name: String,
}

impl Sender {
    fn from_user(user: &User) -> Option<Self> {
        Some(Self {
            id: i64::try_from(user.id.0).ok()?,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingKind {
    /// `/name args`, with any `@botname` suffix stripped from the name
    Command { name: String, args: String },
    Text(String),
    Callback { id: String, data: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incoming {
    pub sender: Sender,
    pub chat_id: i64,
    pub kind: IncomingKind,
}

impl Incoming {
    /// Extracts a text message, command or callback query. Anything else
    /// (edits, joins, updates without a sender) yields `None` and is ignored.
    pub fn from_update(update: &Update) -> Option<Self> {
        match &update.kind {
            UpdateKind::Message(msg) => {
                let sender = Sender::from_user(msg.from.as_ref()?)?;
                let text = msg.text()?;
                let kind = match parse_command(text) {
                    Some((name, args)) => IncomingKind::Command { name, args },
                    None => IncomingKind::Text(text.to_string()),
                };
                Some(Self {
                    sender,
                    chat_id: msg.chat.id.0,
                    kind,
                })
            }
            UpdateKind::CallbackQuery(q) => {
                let sender = Sender::from_user(&q.from)?;
                let chat_id = q.message.as_ref().map(|m| m.chat().id.0).unwrap_or(sender.id);
                Some(Self {
                    chat_id,
                    kind: IncomingKind::Callback {
                        id: q.id.0.clone(),
                        data: q.data.clone().unwrap_or_default(),
                    },
                    sender,
                })
            }
            _ => None,
        }
    }

    pub fn command(&self) -> Option<(&str, &str)> {
        match &self.kind {
            IncomingKind::Command { name, args } => Some((name.as_str(), args.as_str())),
            _ => None,
        }
    }

    /// Deep-link payload of a `/start` command
    pub fn start_payload(&self) -> Option<&str> {
        match self.command() {
            Some(("start", args)) => args.split_whitespace().next(),
            _ => None,
        }
    }

    pub fn is_start(&self) -> bool {
        matches!(self.command(), Some(("start", _)))
    }
}

/// Splits `/name@bot rest of text` into (`name`, `rest of text`)
pub fn parse_command(text: &str) -> Option<(String, String)> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;
    let (head, args) = match rest.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim()),
        None => (rest, ""),
    };
    let name = head.split('@').next().unwrap_or(head);
    if name.is_empty() {
        return None;
    }
    Some((name.to_ascii_lowercase(), args.to_string()))
}
