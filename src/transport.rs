//! Chat transport seam over teloxide.
//!
//! The forward pipeline talks to `RelayTransport` rather than to `Bot`
//! directly, so delivery logic can be exercised against a mock in tests.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    FileId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, Recipient,
};
use tracing::warn;
use url::Url;

/// Resolved chat identity.
pub struct ChatInfo {
    pub id: i64,
    pub username: Option<String>,
    pub title: Option<String>,
}

impl ChatInfo {
    /// Display name: `@username`, then title, then the raw id.
    pub fn label(&self) -> String {
        if let Some(ref username) = self.username {
            return format!("@{username}");
        }
        if let Some(ref title) = self.title {
            return title.clone();
        }
        format!("chat_id: {}", self.id)
    }
}

/// Outbound side of the messaging platform.
///
/// Each send matches one content kind; `origin_link`, when present, is
/// attached as an inline url button pointing back at the original message.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        origin_link: Option<&str>,
    ) -> Result<i64, String>;

    async fn send_photo(
        &self,
        chat_id: i64,
        file: FileId,
        caption: &str,
        origin_link: Option<&str>,
    ) -> Result<i64, String>;

    async fn send_video(
        &self,
        chat_id: i64,
        file: FileId,
        caption: &str,
        origin_link: Option<&str>,
    ) -> Result<i64, String>;

    async fn send_document(
        &self,
        chat_id: i64,
        file: FileId,
        caption: &str,
        origin_link: Option<&str>,
    ) -> Result<i64, String>;

    /// Resolves `@username` (the `@` is optional) to a chat id.
    async fn resolve_username(&self, username: &str) -> Result<i64, String>;

    async fn chat_info(&self, chat_id: i64) -> Result<ChatInfo, String>;
}

/// Teloxide-backed transport.
pub struct TelegramRelay {
    bot: Bot,
}

impl TelegramRelay {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn origin_markup(origin_link: Option<&str>) -> Option<InlineKeyboardMarkup> {
    let link = origin_link?;
    let url = Url::parse(link).ok()?;
    Some(InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::url("↗ Оригинал", url),
    ]]))
}

#[async_trait]
impl RelayTransport for TelegramRelay {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        origin_link: Option<&str>,
    ) -> Result<i64, String> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);
        if let Some(markup) = origin_markup(origin_link) {
            request = request.reply_markup(markup);
        }
        request.await.map(|msg| msg.id.0 as i64).map_err(|e| {
            let msg = format!("Failed to send text to {chat_id}: {e}");
            warn!("{}", msg);
            msg
        })
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        file: FileId,
        caption: &str,
        origin_link: Option<&str>,
    ) -> Result<i64, String> {
        let mut request = self.bot.send_photo(ChatId(chat_id), InputFile::file_id(file));
        if !caption.is_empty() {
            request = request.caption(caption);
        }
        if let Some(markup) = origin_markup(origin_link) {
            request = request.reply_markup(markup);
        }
        request.await.map(|msg| msg.id.0 as i64).map_err(|e| {
            let msg = format!("Failed to send photo to {chat_id}: {e}");
            warn!("{}", msg);
            msg
        })
    }

    async fn send_video(
        &self,
        chat_id: i64,
        file: FileId,
        caption: &str,
        origin_link: Option<&str>,
    ) -> Result<i64, String> {
        let mut request = self.bot.send_video(ChatId(chat_id), InputFile::file_id(file));
        if !caption.is_empty() {
            request = request.caption(caption);
        }
        if let Some(markup) = origin_markup(origin_link) {
            request = request.reply_markup(markup);
        }
        request.await.map(|msg| msg.id.0 as i64).map_err(|e| {
            let msg = format!("Failed to send video to {chat_id}: {e}");
            warn!("{}", msg);
            msg
        })
    }

    async fn send_document(
        &self,
        chat_id: i64,
        file: FileId,
        caption: &str,
        origin_link: Option<&str>,
    ) -> Result<i64, String> {
        let mut request = self
            .bot
            .send_document(ChatId(chat_id), InputFile::file_id(file));
        if !caption.is_empty() {
            request = request.caption(caption);
        }
        if let Some(markup) = origin_markup(origin_link) {
            request = request.reply_markup(markup);
        }
        request.await.map(|msg| msg.id.0 as i64).map_err(|e| {
            let msg = format!("Failed to send document to {chat_id}: {e}");
            warn!("{}", msg);
            msg
        })
    }

    async fn resolve_username(&self, username: &str) -> Result<i64, String> {
        let handle = if username.starts_with('@') {
            username.to_string()
        } else {
            format!("@{username}")
        };
        self.bot
            .get_chat(Recipient::ChannelUsername(handle.clone()))
            .await
            .map(|chat| chat.id.0)
            .map_err(|e| {
                let msg = format!("Failed to resolve {handle}: {e}");
                warn!("{}", msg);
                msg
            })
    }

    async fn chat_info(&self, chat_id: i64) -> Result<ChatInfo, String> {
        self.bot
            .get_chat(Recipient::Id(ChatId(chat_id)))
            .await
            .map(|chat| ChatInfo {
                id: chat.id.0,
                username: chat.username().map(str::to_string),
                title: chat.title().map(str::to_string),
            })
            .map_err(|e| {
                let msg = format!("Failed to get chat {chat_id}: {e}");
                warn!("{}", msg);
                msg
            })
    }
}
