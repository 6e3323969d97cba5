//! arcanus-bot - request pipeline for a chat bot
//!
//! Inbound updates are normalised into a [`RequestDescriptor`] and pushed
//! through a fixed middleware chain (logging, panic recovery, deadline,
//! per-user rate limiting, audit) before the bot handler replies.
//!
//! [`RequestDescriptor`]: domain::entities::RequestDescriptor

pub mod application;
pub mod domain;
pub mod infrastructure;
