//! Application services - Business logic orchestration

pub mod bot_handler;
pub mod rate_limiter;
pub mod user_service;

pub use bot_handler::{BotHandler, CallbackEndpoint, MessageEndpoint};
pub use rate_limiter::{Clock, ManualClock, RateLimiter, SystemClock, UserLimit};
pub use user_service::UserService;
