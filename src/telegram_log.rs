//! Tracing layer that forwards WARN/ERROR events to an operator chat.
//!
//! Forwarding failures are invisible to end users, so this is the only
//! channel through which the operator learns about broken targets.

use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

pub struct TelegramLogLayer {
    tx: mpsc::UnboundedSender<String>,
}

impl TelegramLogLayer {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                send_log(&bot, chat_id, &text).await;
            }
        });

        Self { tx }
    }
}

async fn send_log(bot: &Bot, chat_id: ChatId, text: &str) {
    let text = if text.len() > 4000 {
        let truncated: String = text.chars().take(4000).collect();
        format!("{}...", truncated)
    } else {
        text.to_string()
    };
    if let Err(e) = bot.send_message(chat_id, &text).await {
        eprintln!("Failed to send log to Telegram: {e}");
    }
}

struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else if self.message.is_empty() {
            self.message = format!("{} = {:?}", field.name(), value);
        } else {
            self.message
                .push_str(&format!(", {} = {:?}", field.name(), value));
        }
    }
}

impl<S: Subscriber> Layer<S> for TelegramLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();

        // Only WARN and ERROR reach the operator chat.
        if level > Level::WARN {
            return;
        }

        let mut visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut visitor);

        let msg = match level {
            Level::ERROR => format!("❌ {}", visitor.message),
            _ => format!("⚠️ {}", visitor.message),
        };

        if self.tx.send(msg).is_err() {
            eprintln!("Log channel closed, message dropped");
        }
    }
}
