//! Narrow contracts the middleware chain depends on

use chrono::{DateTime, Utc};

/// Yes/no admission decision for an identity at the current instant
pub trait AdmissionPolicy: Send + Sync {
    fn allow(&self, user_id: i64) -> bool;
}

/// Fire-and-forget sink for admitted actions.
///
/// Implementations must not block for long and must swallow their own failures.
pub trait AuditSink: Send + Sync {
    fn record(&self, user_id: i64, action: &str, timestamp: DateTime<Utc>);
}
