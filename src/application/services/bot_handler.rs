//! Terminal handler: replies to commands and button presses
//!
//! [`BotHandler`] holds the domain routing. [`MessageEndpoint`] and
//! [`CallbackEndpoint`] adapt it to the middleware [`Handler`] shape, one per
//! chain. Every transport call goes through [`Context::run`], so a request
//! abandoned by the timeout layer stops at its next send.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::application::errors::{BotError, PipelineError};
use crate::application::messaging::middleware::{Context, Handler, HandlerResult};
use crate::application::services::UserService;
use crate::domain::entities::{RequestDescriptor, RequestKind, User};
use crate::domain::traits::{Bot, KeyboardButton};
use crate::infrastructure::audit::AuditLogger;

const HELP_TEXT: &str = "Arcanus VPN Bot Help\n\n\
Commands:\n\
/start - Register and get started\n\
/account - View your account details\n\
/help - Show this help message\n\n\
For technical support, contact @support";

const UNKNOWN_COMMAND_TEXT: &str = "Unknown command. Use /help to see available commands.";

pub struct BotHandler {
    bot: Arc<dyn Bot>,
    users: UserService,
    audit: Option<Arc<AuditLogger>>,
}

impl BotHandler {
    pub fn new(bot: Arc<dyn Bot>, users: UserService) -> Self {
        Self {
            bot,
            users,
            audit: None,
        }
    }

    /// Record registrations in the security audit log
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn users(&self) -> &UserService {
        &self.users
    }

    /// Route a text message by command
    pub async fn handle_message(&self, ctx: &Context, request: &RequestDescriptor) -> HandlerResult {
        let RequestKind::Message { text, .. } = &request.kind else {
            return Err(PipelineError::InvalidRequest("expected a message".into()));
        };

        match text.trim() {
            "/start" => self.start(ctx, request).await,
            "/account" => self.account(ctx, request).await,
            "/help" => self.send(ctx, request.chat_id, HELP_TEXT).await,
            _ => self.send(ctx, request.chat_id, UNKNOWN_COMMAND_TEXT).await,
        }
    }

    /// Route an inline keyboard press by its callback data
    pub async fn handle_callback(&self, ctx: &Context, request: &RequestDescriptor) -> HandlerResult {
        let RequestKind::Callback {
            callback_id,
            data,
            message_id,
        } = &request.kind
        else {
            return Err(PipelineError::InvalidRequest("expected a callback".into()));
        };

        match data.as_str() {
            "trial" => match self.users.activate_trial(request.user_id).await {
                Ok(user) => {
                    let text = format!(
                        "Trial Activated!\n\nYour account is now active with {} of data.",
                        format_bytes(user.quota_limit)
                    );
                    self.edit(ctx, request.chat_id, *message_id, &text).await?;
                    self.answer(ctx, callback_id, None).await
                }
                Err(BotError::AlreadyActive(_)) => {
                    self.answer(ctx, callback_id, Some("Your account is already active."))
                        .await
                }
                Err(e) => {
                    error!(user_id = request.user_id, error = %e, "Failed to activate trial");
                    self.answer(ctx, callback_id, Some("Failed to activate trial. Please try again."))
                        .await?;
                    Err(e.into())
                }
            },
            "account" => match self.users.get_user(request.user_id).await {
                Ok(user) => {
                    self.edit(ctx, request.chat_id, *message_id, &format_account(&user))
                        .await?;
                    self.answer(ctx, callback_id, None).await
                }
                Err(e) => {
                    error!(user_id = request.user_id, error = %e, "Failed to get user");
                    self.answer(ctx, callback_id, Some("Failed to get account information."))
                        .await?;
                    Err(e.into())
                }
            },
            "help" => {
                self.edit(ctx, request.chat_id, *message_id, HELP_TEXT).await?;
                self.answer(ctx, callback_id, None).await
            }
            _ => {
                self.answer(ctx, callback_id, Some("Unknown action. Please try again."))
                    .await
            }
        }
    }

    async fn start(&self, ctx: &Context, request: &RequestDescriptor) -> HandlerResult {
        let sender = &request.sender;
        let registered = self
            .users
            .register_user(
                sender.id,
                sender.username.as_deref(),
                &sender.first_name,
                sender.last_name.as_deref(),
            )
            .await;

        if let Some(audit) = &self.audit {
            let error = registered.as_ref().err().map(ToString::to_string);
            audit.log_registration(
                sender.id,
                &request.username,
                &sender.first_name,
                sender.last_name.as_deref().unwrap_or_default(),
                registered.is_ok(),
                error.as_deref(),
            );
        }

        match registered {
            Ok(user) => {
                let text = format!(
                    "Welcome to Arcanus VPN, {}!\n\nYou have {} of free trial data.\n\nChoose an option below:",
                    user.first_name,
                    format_bytes(user.quota_limit)
                );
                self.send(ctx, request.chat_id, &text).await
            }
            Err(e) => {
                error!(user_id = sender.id, error = %e, "Failed to register user");
                self.send(ctx, request.chat_id, "Failed to register user. Please try again.")
                    .await?;
                Err(e.into())
            }
        }
    }

    async fn account(&self, ctx: &Context, request: &RequestDescriptor) -> HandlerResult {
        match self.users.get_user(request.user_id).await {
            Ok(user) => self.send(ctx, request.chat_id, &format_account(&user)).await,
            Err(e) => {
                error!(user_id = request.user_id, error = %e, "Failed to get user");
                self.send(
                    ctx,
                    request.chat_id,
                    "Failed to get account information. Please use /start first.",
                )
                .await?;
                Err(e.into())
            }
        }
    }

    async fn send(&self, ctx: &Context, chat_id: i64, text: &str) -> HandlerResult {
        let message_id = ctx
            .run(self.bot.send_message(chat_id, text, &main_keyboard()))
            .await??;
        debug!(chat_id, message_id, "Message sent");
        Ok(())
    }

    async fn edit(&self, ctx: &Context, chat_id: i64, message_id: i64, text: &str) -> HandlerResult {
        ctx.run(self.bot.edit_message(chat_id, message_id, text, &main_keyboard()))
            .await??;
        Ok(())
    }

    async fn answer(&self, ctx: &Context, callback_id: &str, text: Option<&str>) -> HandlerResult {
        ctx.run(self.bot.answer_callback(callback_id, text)).await??;
        Ok(())
    }
}

/// Keyboard attached to every reply
pub fn main_keyboard() -> Vec<Vec<KeyboardButton>> {
    vec![
        vec![
            KeyboardButton::new("Get Free Trial").with_callback("trial"),
            KeyboardButton::new("My Account").with_callback("account"),
        ],
        vec![KeyboardButton::new("Help").with_callback("help")],
    ]
}

fn format_account(user: &User) -> String {
    let status = if user.is_active() { "Active" } else { "Inactive" };
    format!(
        "Account Information\n\n\
         Name: {}\n\
         Username: @{}\n\
         Status: {}\n\
         Data Limit: {}\n\
         Data Used: {}\n\
         Data Remaining: {}\n\
         Member Since: {}",
        user.display_name(),
        user.username.as_deref().unwrap_or("-"),
        status,
        format_bytes(user.quota_limit),
        format_bytes(user.quota_used),
        format_bytes(user.quota_remaining()),
        user.created_at.format("%b %-d, %Y"),
    )
}

/// Human readable byte count with binary units, e.g. `50.0 MB`
pub fn format_bytes(bytes: i64) -> String {
    const UNIT: i64 = 1024;
    if bytes < UNIT {
        return format!("{} B", bytes);
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let suffix = ['K', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {}B", bytes as f64 / div as f64, suffix)
}

/// Terminal of the message chain
pub struct MessageEndpoint {
    handler: Arc<BotHandler>,
}

impl MessageEndpoint {
    pub fn new(handler: Arc<BotHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl Handler for MessageEndpoint {
    async fn call(&self, ctx: Context, request: Arc<RequestDescriptor>) -> HandlerResult {
        self.handler.handle_message(&ctx, &request).await
    }
}

/// Terminal of the callback chain
pub struct CallbackEndpoint {
    handler: Arc<BotHandler>,
}

impl CallbackEndpoint {
    pub fn new(handler: Arc<BotHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl Handler for CallbackEndpoint {
    async fn call(&self, ctx: Context, request: Arc<RequestDescriptor>) -> HandlerResult {
        self.handler.handle_callback(&ctx, &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{InboundUpdate, Sender, UserStatus};
    use crate::domain::traits::BotInfo;
    use crate::infrastructure::storage::MemoryStore;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        Message(i64, String),
        Edit(i64, i64, String),
        Answer(String, Option<String>),
    }

    #[derive(Default)]
    struct RecordingBot {
        sent: Mutex<Vec<Sent>>,
    }

    impl RecordingBot {
        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Bot for RecordingBot {
        async fn send_message(&self, chat_id: i64, text: &str, _keyboard: &[Vec<KeyboardButton>]) -> Result<i64, BotError> {
            let mut sent = self.sent.lock().unwrap();
            sent.push(Sent::Message(chat_id, text.to_string()));
            Ok(sent.len() as i64)
        }

        async fn edit_message(&self, chat_id: i64, message_id: i64, text: &str, _keyboard: &[Vec<KeyboardButton>]) -> Result<(), BotError> {
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Edit(chat_id, message_id, text.to_string()));
            Ok(())
        }

        async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<(), BotError> {
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Answer(callback_id.to_string(), text.map(str::to_string)));
            Ok(())
        }

        fn bot_info(&self) -> BotInfo {
            BotInfo {
                id: "test".into(),
                name: "test".into(),
                username: "test_bot".into(),
            }
        }
    }

    fn setup() -> (Arc<BotHandler>, Arc<RecordingBot>) {
        let bot = Arc::new(RecordingBot::default());
        let users = UserService::new(Arc::new(MemoryStore::new()));
        (Arc::new(BotHandler::new(bot.clone(), users)), bot)
    }

    fn message(text: &str) -> RequestDescriptor {
        RequestDescriptor::from_update(InboundUpdate::Message {
            message_id: 10,
            chat_id: 20,
            from: Some(Sender::new(30, "Ann").with_username("ann")),
            text: text.into(),
        })
        .unwrap()
    }

    fn callback(data: &str) -> RequestDescriptor {
        RequestDescriptor::from_update(InboundUpdate::Callback {
            callback_id: "cb-1".into(),
            message_id: 10,
            chat_id: 20,
            from: Some(Sender::new(30, "Ann")),
            data: data.into(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_start_registers_and_welcomes() {
        let (handler, bot) = setup();
        handler.handle_message(&Context::new(), &message("/start")).await.unwrap();

        let user = handler.users().get_user(30).await.unwrap();
        assert_eq!(user.username.as_deref(), Some("ann"));
        match &bot.sent()[..] {
            [Sent::Message(20, text)] => assert!(text.contains("Welcome to Arcanus VPN, Ann")),
            other => panic!("unexpected replies: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_account_requires_registration() {
        let (handler, bot) = setup();
        let err = handler
            .handle_message(&Context::new(), &message("/account"))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Handler(BotError::UserNotFound(30))));
        assert_eq!(bot.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_text_gets_hint() {
        let (handler, bot) = setup();
        handler.handle_message(&Context::new(), &message("hello")).await.unwrap();
        assert_eq!(bot.sent(), vec![Sent::Message(20, UNKNOWN_COMMAND_TEXT.to_string())]);
    }

    #[tokio::test]
    async fn test_trial_callback_edits_and_answers() {
        let (handler, bot) = setup();
        let ctx = Context::new();
        handler.handle_message(&ctx, &message("/start")).await.unwrap();
        handler.handle_callback(&ctx, &callback("trial")).await.unwrap();

        assert_eq!(handler.users().get_user(30).await.unwrap().status, UserStatus::Trial);
        let sent = bot.sent();
        assert!(matches!(&sent[1], Sent::Edit(20, 10, text) if text.contains("50.0 MB")));
        assert_eq!(sent[2], Sent::Answer("cb-1".into(), None));

        handler.handle_callback(&ctx, &callback("trial")).await.unwrap();
        assert_eq!(
            bot.sent().last(),
            Some(&Sent::Answer("cb-1".into(), Some("Your account is already active.".into())))
        );
    }

    #[tokio::test]
    async fn test_unknown_callback_is_answered() {
        let (handler, bot) = setup();
        handler.handle_callback(&Context::new(), &callback("nope")).await.unwrap();
        assert_eq!(
            bot.sent(),
            vec![Sent::Answer("cb-1".into(), Some("Unknown action. Please try again.".into()))]
        );
    }

    #[tokio::test]
    async fn test_endpoints_reject_wrong_variant() {
        let (handler, _bot) = setup();
        let err = MessageEndpoint::new(handler.clone())
            .call(Context::new(), Arc::new(callback("help")))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRequest(_)));

        let err = CallbackEndpoint::new(handler)
            .call(Context::new(), Arc::new(message("/help")))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_cancelled_context_stops_sends() {
        let (handler, bot) = setup();
        let ctx = Context::new();
        ctx.cancel();

        let err = handler.handle_message(&ctx, &message("/help")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert!(bot.sent().is_empty());
    }

    #[test]
    fn test_main_keyboard_buttons_carry_callbacks() {
        let data: Vec<_> = main_keyboard()
            .into_iter()
            .flatten()
            .map(|b| b.callback_data)
            .collect();
        assert_eq!(
            data,
            vec![Some("trial".to_string()), Some("account".to_string()), Some("help".to_string())]
        );
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(52_428_800), "50.0 MB");
    }
}
