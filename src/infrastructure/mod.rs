//! Infrastructure layer - External concerns
//!
//! This layer contains:
//! - Config: Configuration loading
//! - Storage: User persistence
//! - Audit: Security audit log
//! - Logging: Tracing subscriber setup
//! - Adapters: Platform integrations (console)

pub mod adapters;
pub mod audit;
pub mod config;
pub mod logging;
pub mod storage;
