use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::{BoxHandler, Context, Handler, HandlerResult, Middleware};
use crate::application::errors::PipelineError;
use crate::domain::entities::RequestDescriptor;
use crate::domain::traits::AdmissionPolicy;

/// Rejects requests the admission policy refuses, without calling the inner handler
#[derive(Clone)]
pub struct RateLimitMiddleware {
    policy: Arc<dyn AdmissionPolicy>,
}

impl RateLimitMiddleware {
    pub fn new(policy: Arc<dyn AdmissionPolicy>) -> Self {
        Self { policy }
    }
}

impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(RateLimit {
            policy: self.policy.clone(),
            next,
        })
    }
}

struct RateLimit {
    policy: Arc<dyn AdmissionPolicy>,
    next: BoxHandler,
}

#[async_trait]
impl Handler for RateLimit {
    async fn call(&self, ctx: Context, request: Arc<RequestDescriptor>) -> HandlerResult {
        if !self.policy.allow(request.user_id) {
            warn!(user_id = request.user_id, chat_id = request.chat_id, "Rate limit exceeded");
            return Err(PipelineError::RateLimitExceeded {
                user_id: request.user_id,
            });
        }

        self.next.call(ctx, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::messaging::middleware::handler_fn;
    use crate::domain::entities::{InboundUpdate, Sender};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Deny;

    impl AdmissionPolicy for Deny {
        fn allow(&self, _user_id: i64) -> bool {
            false
        }
    }

    struct Allow;

    impl AdmissionPolicy for Allow {
        fn allow(&self, _user_id: i64) -> bool {
            true
        }
    }

    fn counting_terminal(calls: Arc<AtomicUsize>) -> BoxHandler {
        Arc::new(handler_fn(move |_ctx, _req| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { HandlerResult::Ok(()) }
        }))
    }

    fn request() -> Arc<RequestDescriptor> {
        let update = InboundUpdate::Message {
            message_id: 1,
            chat_id: 2,
            from: Some(Sender::new(99, "Test")),
            text: "hi".into(),
        };
        Arc::new(RequestDescriptor::from_update(update).unwrap())
    }

    #[tokio::test]
    async fn test_rejection_skips_terminal() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = RateLimitMiddleware::new(Arc::new(Deny)).wrap(counting_terminal(calls.clone()));

        let err = handler.call(Context::new(), request()).await.unwrap_err();
        assert!(matches!(err, PipelineError::RateLimitExceeded { user_id: 99 }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_admitted_request_reaches_terminal() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = RateLimitMiddleware::new(Arc::new(Allow)).wrap(counting_terminal(calls.clone()));

        handler.call(Context::new(), request()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
