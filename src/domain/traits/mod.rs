//! Domain traits - Abstractions for infrastructure implementations

pub mod bot;
pub mod policy;
pub mod store;

pub use bot::{Bot, BotInfo, KeyboardButton};
pub use policy::{AdmissionPolicy, AuditSink};
pub use store::UserStore;
