//! Domain entities - Core business objects with no external dependencies

pub mod user;
pub mod request;

pub use user::{User, UserStatus, DEFAULT_QUOTA_LIMIT};
pub use request::{InboundUpdate, RequestDescriptor, RequestKind, Sender};
