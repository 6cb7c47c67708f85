//! Messenger that records every outgoing call instead of talking to Telegram

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use boothbot::messenger::{Messenger, OutgoingFile, OutgoingText};
use boothcore::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text { chat_id: i64, message: OutgoingText },
    Document { chat_id: i64, file: OutgoingFile },
    Photo { chat_id: i64, file: OutgoingFile },
}

impl Sent {
    pub fn chat_id(&self) -> i64 {
        match self {
            Self::Text { chat_id, .. } | Self::Document { chat_id, .. } | Self::Photo { chat_id, .. } => *chat_id,
        }
    }
}

#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<Sent>>,
    failing_chats: Mutex<HashSet<i64>>,
    webhooks: Mutex<Vec<String>>,
    commands: Mutex<Vec<String>>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send to `chat_id` fails from now on
    pub fn fail_for(&self, chat_id: i64) {
        self.failing_chats.lock().unwrap().insert(chat_id);
    }

    fn check(&self, chat_id: i64) -> AppResult<()> {
        if self.failing_chats.lock().unwrap().contains(&chat_id) {
            return Err(AppError::Unavailable(format!("Forbidden: bot was blocked by user {}", chat_id)));
        }
        Ok(())
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn sent_to(&self, chat_id: i64) -> Vec<Sent> {
        self.sent().into_iter().filter(|s| s.chat_id() == chat_id).collect()
    }

    pub fn texts_to(&self, chat_id: i64) -> Vec<String> {
        self.sent_to(chat_id)
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { message, .. } => Some(message.text),
                _ => None,
            })
            .collect()
    }

    pub fn last_text_to(&self, chat_id: i64) -> Option<OutgoingText> {
        self.sent_to(chat_id).into_iter().rev().find_map(|s| match s {
            Sent::Text { message, .. } => Some(message),
            _ => None,
        })
    }

    pub fn documents(&self) -> Vec<OutgoingFile> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Document { file, .. } => Some(file),
                _ => None,
            })
            .collect()
    }

    pub fn photos(&self) -> Vec<OutgoingFile> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Photo { file, .. } => Some(file),
                _ => None,
            })
            .collect()
    }

    pub fn webhooks(&self) -> Vec<String> {
        self.webhooks.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(&self, chat_id: i64, message: OutgoingText) -> AppResult<()> {
        self.check(chat_id)?;
        self.sent.lock().unwrap().push(Sent::Text { chat_id, message });
        Ok(())
    }

    async fn send_document(&self, chat_id: i64, file: OutgoingFile) -> AppResult<()> {
        self.check(chat_id)?;
        self.sent.lock().unwrap().push(Sent::Document { chat_id, file });
        Ok(())
    }

    async fn send_photo(&self, chat_id: i64, file: OutgoingFile) -> AppResult<()> {
        self.check(chat_id)?;
        self.sent.lock().unwrap().push(Sent::Photo { chat_id, file });
        Ok(())
    }

    async fn answer_callback(&self, _callback_id: &str) -> AppResult<()> {
        Ok(())
    }

    async fn set_webhook(&self, url: &str) -> AppResult<()> {
        self.webhooks.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn set_commands(&self, commands: &[(&str, &str)]) -> AppResult<()> {
        let mut recorded = self.commands.lock().unwrap();
        recorded.clear();
        recorded.extend(commands.iter().map(|(name, _)| name.to_string()));
        Ok(())
    }
}
