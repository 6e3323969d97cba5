//! Middleware system for the request-processing pipeline
//!
//! A [`Handler`] turns a request into `Ok(())` or a [`PipelineError`]. A
//! [`Middleware`] decorates a handler with one cross-cutting concern and
//! returns a handler of the same shape. [`MiddlewareChain`] nests them once,
//! at assembly time: the first middleware added is the outermost, so it runs
//! first on the way in and last on the way out.

mod audit;
mod context;
mod logging;
mod rate_limit;
mod recovery;
mod timeout;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::application::errors::PipelineError;
use crate::domain::entities::RequestDescriptor;

pub use audit::AuditMiddleware;
pub use context::Context;
pub use logging::LoggingMiddleware;
pub use rate_limit::RateLimitMiddleware;
pub use recovery::{panic_to_error, RecoveryMiddleware};
pub use timeout::TimeoutMiddleware;

/// Result of handling one request
pub type HandlerResult = Result<(), PipelineError>;

/// Shared, type-erased handler
pub type BoxHandler = Arc<dyn Handler>;

/// Processes one request. Implemented by the terminal handler and by every
/// middleware layer.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, ctx: Context, request: Arc<RequestDescriptor>) -> HandlerResult;
}

/// Decorator over a handler
pub trait Middleware: Send + Sync {
    /// Short name used when logging the assembled chain
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn wrap(&self, next: BoxHandler) -> BoxHandler;
}

impl<F> Middleware for F
where
    F: Fn(BoxHandler) -> BoxHandler + Send + Sync,
{
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        self(next)
    }
}

/// Handler backed by an async closure
pub struct HandlerFn<F>(F);

/// Build a handler from `|ctx, request| async { ... }`
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Context, Arc<RequestDescriptor>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    HandlerFn(f)
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Context, Arc<RequestDescriptor>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn call(&self, ctx: Context, request: Arc<RequestDescriptor>) -> HandlerResult {
        (self.0)(ctx, request).await
    }
}

/// Ordered list of middleware, outermost first
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    pub fn add<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn add_shared(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Wrap `terminal` so that the first middleware is outermost
    pub fn build(&self, terminal: BoxHandler) -> BoxHandler {
        chain(terminal, &self.middlewares)
    }
}

/// `chain(h, [m1, m2, m3])` is `m1(m2(m3(h)))`
pub fn chain(terminal: BoxHandler, middlewares: &[Arc<dyn Middleware>]) -> BoxHandler {
    middlewares
        .iter()
        .rev()
        .fold(terminal, |next, middleware| middleware.wrap(next))
}
