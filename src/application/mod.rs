//! Application layer - Use cases and business logic
//!
//! This layer contains:
//! - Services: Rate limiting, user lifecycle and the terminal bot handler
//! - Errors: Pipeline and domain errors
//! - Messaging: Middleware chains and the dispatch pipeline

pub mod errors;
pub mod messaging;
pub mod services;
