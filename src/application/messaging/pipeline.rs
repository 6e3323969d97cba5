//! Pipeline - routes inbound updates through the middleware chains
//!
//! Two chains share one middleware stack, `[logging, recovery, timeout,
//! rate_limit, audit]`, and differ only in their terminal: one for text
//! messages, one for button presses. Both are assembled once in
//! [`Pipeline::new`] and reused for every update.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::middleware::{
    AuditMiddleware, BoxHandler, Context, LoggingMiddleware, MiddlewareChain, RateLimitMiddleware,
    RecoveryMiddleware, TimeoutMiddleware,
};
use crate::application::errors::{ErrorKind, PipelineError};
use crate::application::services::{BotHandler, CallbackEndpoint, MessageEndpoint};
use crate::domain::entities::{InboundUpdate, RequestDescriptor};
use crate::domain::traits::{AdmissionPolicy, AuditSink};

/// Terminal state of one inbound update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    /// Admitted, then failed inside the chain
    Failed(ErrorKind),
    /// Refused before reaching the terminal handler
    Rejected(ErrorKind),
}

impl Outcome {
    pub fn from_result(result: &Result<(), PipelineError>) -> Self {
        match result {
            Ok(()) => Outcome::Succeeded,
            Err(e) if e.is_rejection() => Outcome::Rejected(e.kind()),
            Err(e) => Outcome::Failed(e.kind()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded)
    }
}

pub struct Pipeline {
    message_chain: BoxHandler,
    callback_chain: BoxHandler,
    middleware_names: Vec<&'static str>,
}

impl Pipeline {
    pub fn new(
        handler: Arc<BotHandler>,
        policy: Arc<dyn AdmissionPolicy>,
        audit: Arc<dyn AuditSink>,
        timeout: Duration,
    ) -> Self {
        let chain = Self::default_chain(policy, audit, timeout);
        Self::with_chain(
            &chain,
            Arc::new(MessageEndpoint::new(handler.clone())),
            Arc::new(CallbackEndpoint::new(handler)),
        )
    }

    /// The production middleware order, outermost first
    pub fn default_chain(
        policy: Arc<dyn AdmissionPolicy>,
        audit: Arc<dyn AuditSink>,
        timeout: Duration,
    ) -> MiddlewareChain {
        MiddlewareChain::new()
            .add(LoggingMiddleware::new())
            .add(RecoveryMiddleware::new())
            .add(TimeoutMiddleware::new(timeout))
            .add(RateLimitMiddleware::new(policy))
            .add(AuditMiddleware::new(audit))
    }

    /// Assemble a pipeline from an arbitrary chain and terminals
    pub fn with_chain(chain: &MiddlewareChain, message: BoxHandler, callback: BoxHandler) -> Self {
        let middleware_names = chain.names();
        info!(middleware = ?middleware_names, "Pipeline assembled");
        Self {
            message_chain: chain.build(message),
            callback_chain: chain.build(callback),
            middleware_names,
        }
    }

    pub fn middleware_names(&self) -> &[&'static str] {
        &self.middleware_names
    }

    /// Normalise `update`, run it through the matching chain and report how it ended
    pub async fn dispatch(&self, ctx: Context, update: InboundUpdate) -> Outcome {
        let request = match RequestDescriptor::from_update(update) {
            Ok(request) => Arc::new(request),
            Err(e) => {
                warn!(error = %e, "Dropping update that cannot be normalised");
                return Outcome::Rejected(e.kind());
            }
        };

        let result = self.process(ctx, request).await;
        let outcome = Outcome::from_result(&result);
        debug!(?outcome, "Update dispatched");
        outcome
    }

    /// Run an already normalised request, returning the raw chain result
    pub async fn process(&self, ctx: Context, request: Arc<RequestDescriptor>) -> Result<(), PipelineError> {
        let chain = if request.is_callback() {
            &self.callback_chain
        } else {
            &self.message_chain
        };
        chain.call(ctx, request).await
    }
}
