//! Domain layer - Core business logic with no external dependencies
//!
//! This layer contains:
//! - Entities: Core business objects (User, InboundUpdate, RequestDescriptor)
//! - Traits: Abstractions for collaborators (Bot, UserStore, AdmissionPolicy, AuditSink)

pub mod entities;
pub mod traits;
