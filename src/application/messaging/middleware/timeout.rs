//! Deadline enforcement.
//!
//! The inner handler runs on its own tokio task with a child context carrying
//! the deadline. The calling flow races the task's result against the
//! deadline and returns `Timeout` as soon as the deadline wins, without
//! waiting for the task.
//!
//! On expiry the child context is cancelled. A handler that awaits through
//! [`Context::run`] or checks [`Context::is_done`] stops promptly; one that
//! ignores its context keeps running detached until it finishes on its own,
//! and its result is discarded.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::oneshot;
use tracing::warn;

use super::{panic_to_error, BoxHandler, Context, Handler, HandlerResult, Middleware};
use crate::application::errors::PipelineError;
use crate::domain::entities::RequestDescriptor;

#[derive(Debug, Clone, Copy)]
pub struct TimeoutMiddleware {
    duration: Duration,
}

impl TimeoutMiddleware {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Middleware for TimeoutMiddleware {
    fn name(&self) -> &'static str {
        "timeout"
    }

    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(Timeout {
            next,
            duration: self.duration,
        })
    }
}

struct Timeout {
    next: BoxHandler,
    duration: Duration,
}

#[async_trait]
impl Handler for Timeout {
    async fn call(&self, ctx: Context, request: Arc<RequestDescriptor>) -> HandlerResult {
        let child = ctx.with_timeout(self.duration);
        let (tx, rx) = oneshot::channel();

        let next = self.next.clone();
        let task_ctx = child.clone();
        let task_request = request.clone();
        tokio::spawn(async move {
            let result = match AssertUnwindSafe(next.call(task_ctx, task_request))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(payload) => Err(panic_to_error(payload)),
            };
            // Receiver is gone if the deadline already won
            let _ = tx.send(result);
        });

        let outcome = tokio::select! {
            biased;

            result = rx => result.unwrap_or_else(|_| {
                Err(PipelineError::Internal("handler task dropped its result".into()))
            }),
            _ = child.done() => {
                if ctx.is_cancelled() {
                    Err(PipelineError::Cancelled)
                } else {
                    warn!(
                        user_id = request.user_id,
                        timeout_ms = self.duration.as_millis() as u64,
                        "Handler exceeded deadline, abandoning it"
                    );
                    Err(PipelineError::Timeout(self.duration))
                }
            }
        };

        child.cancel();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::messaging::middleware::handler_fn;
    use crate::domain::entities::{InboundUpdate, Sender};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::time::Instant;

    fn request() -> Arc<RequestDescriptor> {
        let update = InboundUpdate::Message {
            message_id: 1,
            chat_id: 2,
            from: Some(Sender::new(3, "Test")),
            text: "/account".into(),
        };
        Arc::new(RequestDescriptor::from_update(update).unwrap())
    }

    fn sleeper(duration: Duration) -> BoxHandler {
        Arc::new(handler_fn(move |_ctx, _req| async move {
            tokio::time::sleep(duration).await;
            HandlerResult::Ok(())
        }))
    }

    #[tokio::test]
    async fn test_fast_handler_result_is_returned() {
        let handler = TimeoutMiddleware::new(Duration::from_secs(1)).wrap(sleeper(Duration::from_millis(5)));
        assert!(handler.call(Context::new(), request()).await.is_ok());
    }

    #[tokio::test]
    async fn test_slow_handler_times_out_without_waiting() {
        let handler = TimeoutMiddleware::new(Duration::from_millis(50)).wrap(sleeper(Duration::from_secs(10)));

        let started = Instant::now();
        let err = handler.call(Context::new(), request()).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, PipelineError::Timeout(d) if d == Duration::from_millis(50)));
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_secs(2), "waited {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_cooperative_handler_observes_cancellation() {
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = stopped.clone();
        let terminal: BoxHandler = Arc::new(handler_fn(move |ctx: Context, _req| {
            let flag = flag.clone();
            async move {
                let outcome = ctx.run(tokio::time::sleep(Duration::from_secs(10))).await;
                if outcome.is_err() {
                    flag.store(true, Ordering::SeqCst);
                }
                outcome
            }
        }));

        let handler = TimeoutMiddleware::new(Duration::from_millis(30)).wrap(terminal);
        let err = handler.call(Context::new(), request()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Timeout(_)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panic_inside_task_is_delivered_as_error() {
        let terminal: BoxHandler = Arc::new(handler_fn(|_ctx, _req| async {
            if true {
                panic!("inside task");
            }
            HandlerResult::Ok(())
        }));
        let handler = TimeoutMiddleware::new(Duration::from_secs(1)).wrap(terminal);
        let err = handler.call(Context::new(), request()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Internal(_)));
    }

    #[tokio::test]
    async fn test_parent_cancellation_reports_cancelled() {
        let handler = TimeoutMiddleware::new(Duration::from_secs(5)).wrap(sleeper(Duration::from_secs(10)));
        let ctx = Context::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = handler.call(ctx, request()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }
}
