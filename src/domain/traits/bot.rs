use async_trait::async_trait;
use crate::application::errors::BotError;

/// Bot trait - abstraction for the messaging platform the terminal handler replies through
#[async_trait]
pub trait Bot: Send + Sync {
    /// Send a message to a chat, returning the new message id
    async fn send_message(&self, chat_id: i64, text: &str, keyboard: &[Vec<KeyboardButton>]) -> Result<i64, BotError>;

    /// Replace the text and keyboard of an already sent message
    async fn edit_message(&self, chat_id: i64, message_id: i64, text: &str, keyboard: &[Vec<KeyboardButton>]) -> Result<(), BotError>;

    /// Answer a callback query
    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<(), BotError>;

    /// Get bot info
    fn bot_info(&self) -> BotInfo;
}

/// Keyboard button for inline keyboards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyboardButton {
    pub text: String,
    pub callback_data: Option<String>,
}

impl KeyboardButton {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: None,
        }
    }

    pub fn with_callback(mut self, data: impl Into<String>) -> Self {
        self.callback_data = Some(data.into());
        self
    }
}

/// Bot information
#[derive(Debug, Clone)]
pub struct BotInfo {
    pub id: String,
    pub name: String,
    pub username: String,
}
