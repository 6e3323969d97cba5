use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use super::{BoxHandler, Context, Handler, HandlerResult, Middleware};
use crate::domain::entities::RequestDescriptor;
use crate::domain::traits::AuditSink;

/// Records `(user, action, time)` for every request that reaches it, then delegates.
///
/// The sink can never veto a request: a panicking sink is logged and ignored.
#[derive(Clone)]
pub struct AuditMiddleware {
    sink: Arc<dyn AuditSink>,
}

impl AuditMiddleware {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }
}

impl Middleware for AuditMiddleware {
    fn name(&self) -> &'static str {
        "audit"
    }

    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(Audit {
            sink: self.sink.clone(),
            next,
        })
    }
}

struct Audit {
    sink: Arc<dyn AuditSink>,
    next: BoxHandler,
}

#[async_trait]
impl Handler for Audit {
    async fn call(&self, ctx: Context, request: Arc<RequestDescriptor>) -> HandlerResult {
        let action = request.action_label();
        let recorded = catch_unwind(AssertUnwindSafe(|| {
            self.sink.record(request.user_id, &action, Utc::now())
        }));
        if recorded.is_err() {
            warn!(user_id = request.user_id, "Audit sink panicked, continuing");
        }

        self.next.call(ctx, request).await
    }
}
