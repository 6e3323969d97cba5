//! Panic containment

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::error;

use super::{BoxHandler, Context, Handler, HandlerResult, Middleware};
use crate::application::errors::{BotError, PipelineError};
use crate::domain::entities::RequestDescriptor;

/// Converts a panic inside the inner handler into an error result.
///
/// A panic raised with a `PipelineError` or `BotError` payload (via
/// `std::panic::panic_any`) is returned as that error. A boxed
/// `dyn Error + Send + Sync` or an `io::Error` payload is kept as the source
/// of `PipelineError::Panicked`. A panic payload is `dyn Any`, so other
/// concrete error types cannot be recognised; panic with them boxed as
/// `Box<dyn Error + Send + Sync>` to keep them. Anything else becomes
/// `PipelineError::Internal`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecoveryMiddleware;

impl RecoveryMiddleware {
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for RecoveryMiddleware {
    fn name(&self) -> &'static str {
        "recovery"
    }

    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(Recovery { next })
    }
}

struct Recovery {
    next: BoxHandler,
}

#[async_trait]
impl Handler for Recovery {
    async fn call(&self, ctx: Context, request: Arc<RequestDescriptor>) -> HandlerResult {
        let user_id = request.user_id;
        match AssertUnwindSafe(self.next.call(ctx, request)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let err = panic_to_error(payload);
                error!(user_id, panic = %err, "Handler panicked");
                Err(err)
            }
        }
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Map a panic payload to the error it carried, or to `Internal`
pub fn panic_to_error(payload: Box<dyn Any + Send>) -> PipelineError {
    let payload = match payload.downcast::<PipelineError>() {
        Ok(err) => return *err,
        Err(other) => other,
    };
    let payload = match payload.downcast::<BotError>() {
        Ok(err) => return PipelineError::Handler(*err),
        Err(other) => other,
    };
    let payload = match payload.downcast::<BoxError>() {
        Ok(err) => return PipelineError::Panicked(*err),
        Err(other) => other,
    };
    let payload = match payload.downcast::<std::io::Error>() {
        Ok(err) => return PipelineError::Panicked(err),
        Err(other) => other,
    };

    let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };
    PipelineError::Internal(format!("handler panicked: {}", message))
}
