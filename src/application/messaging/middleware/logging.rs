use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::{BoxHandler, Context, Handler, HandlerResult, Middleware};
use crate::domain::entities::{RequestDescriptor, RequestKind};

/// Logging middleware: start, completion, duration and outcome of every request
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for LoggingMiddleware {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(Logging { next })
    }
}

struct Logging {
    next: BoxHandler,
}

#[async_trait]
impl Handler for Logging {
    async fn call(&self, ctx: Context, request: Arc<RequestDescriptor>) -> HandlerResult {
        let span = info_span!(
            "request",
            request_id = %Uuid::new_v4(),
            user_id = request.user_id,
            chat_id = request.chat_id,
        );

        async move {
            let start = Instant::now();

            match &request.kind {
                RequestKind::Message { text, message_id } => {
                    info!(username = %request.username, text = %text, message_id, "Processing message");
                }
                RequestKind::Callback { data, message_id, .. } => {
                    info!(username = %request.username, callback_data = %data, message_id, "Processing callback");
                }
            }

            let result = self.next.call(ctx, request.clone()).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(()) => info!(duration_ms, "Request completed"),
                Err(e) if e.is_rejection() => {
                    warn!(duration_ms, error = %e, kind = e.kind().as_str(), "Request rejected")
                }
                Err(e) => error!(duration_ms, error = %e, kind = e.kind().as_str(), "Request failed"),
            }

            result
        }
        .instrument(span)
        .await
    }
}
