//! Console adapter for development/testing
//!
//! Replies are printed to stdout. Input lines become inbound updates: a line
//! starting with `cb:` is a button press carrying the rest as callback data,
//! anything else is a text message.

use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::application::errors::BotError;
use crate::domain::entities::{InboundUpdate, Sender};
use crate::domain::traits::{Bot, BotInfo, KeyboardButton};

const CALLBACK_PREFIX: &str = "cb:";

/// Console bot adapter for local development
pub struct ConsoleAdapter {
    info: BotInfo,
    next_message_id: AtomicI64,
    next_callback_id: AtomicI64,
}

impl ConsoleAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            info: BotInfo {
                id: "console".to_string(),
                name: name.into(),
                username: "console".to_string(),
            },
            next_message_id: AtomicI64::new(1),
            next_callback_id: AtomicI64::new(1),
        }
    }

    fn next_id(&self) -> i64 {
        self.next_message_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Id of the most recently sent message, used as the target of `cb:` presses
    pub fn last_message_id(&self) -> i64 {
        self.next_message_id.load(Ordering::Relaxed) - 1
    }

    /// Turn one input line into an update. Blank lines yield `None`.
    pub fn parse_line(&self, chat_id: i64, sender: &Sender, line: &str) -> Option<InboundUpdate> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let update = match line.strip_prefix(CALLBACK_PREFIX) {
            Some(data) => InboundUpdate::Callback {
                callback_id: format!(
                    "console-{}",
                    self.next_callback_id.fetch_add(1, Ordering::Relaxed)
                ),
                message_id: self.last_message_id(),
                chat_id,
                from: Some(sender.clone()),
                data: data.trim().to_string(),
            },
            None => InboundUpdate::Message {
                message_id: self.next_id(),
                chat_id,
                from: Some(sender.clone()),
                text: line.to_string(),
            },
        };
        Some(update)
    }
}

impl Default for ConsoleAdapter {
    fn default() -> Self {
        Self::new("arcanus-bot")
    }
}

fn print_keyboard(keyboard: &[Vec<KeyboardButton>]) {
    for row in keyboard {
        let row_text: Vec<String> = row
            .iter()
            .map(|b| match &b.callback_data {
                Some(data) => format!("{} ({}{})", b.text, CALLBACK_PREFIX, data),
                None => b.text.clone(),
            })
            .collect();
        println!("  [Buttons] {}", row_text.join(" | "));
    }
}

#[async_trait]
impl Bot for ConsoleAdapter {
    async fn send_message(&self, _chat_id: i64, text: &str, keyboard: &[Vec<KeyboardButton>]) -> Result<i64, BotError> {
        let id = self.next_id();
        println!("[BOT] {}", text);
        print_keyboard(keyboard);
        Ok(id)
    }

    async fn edit_message(&self, _chat_id: i64, message_id: i64, text: &str, keyboard: &[Vec<KeyboardButton>]) -> Result<(), BotError> {
        println!("[BOT] (edit #{}) {}", message_id, text);
        print_keyboard(keyboard);
        Ok(())
    }

    async fn answer_callback(&self, _callback_id: &str, text: Option<&str>) -> Result<(), BotError> {
        if let Some(text) = text {
            println!("[BOT] {}", text);
        }
        Ok(())
    }

    fn bot_info(&self) -> BotInfo {
        self.info.clone()
    }
}
