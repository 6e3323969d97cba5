//! Cancellable request context threaded through the chain

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::application::errors::PipelineError;

/// Cancellation scope for one request.
///
/// A context is cancelled explicitly through its token or expires when its
/// deadline passes. Children derived with [`Context::with_timeout`] observe
/// the parent's cancellation; cancelling a child never affects the parent.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root context driven by an externally owned token (e.g. process shutdown)
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Child context whose deadline is at most `timeout` from now
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < candidate => parent,
            _ => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once the token (or an ancestor's) was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.is_expired()
    }

    /// Resolves when the context is cancelled or its deadline elapses
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Run `fut` unless the context finishes first.
    ///
    /// Handlers wrap their blocking steps in this so a timed-out call stops
    /// instead of running on detached.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, PipelineError>
    where
        F: Future,
    {
        tokio::select! {
            biased;

            _ = self.done() => Err(PipelineError::Cancelled),
            output = fut => Ok(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_child_inherits_shorter_parent_deadline() {
        let parent = Context::new().with_timeout(Duration::from_millis(50));
        let child = parent.with_timeout(Duration::from_secs(10));
        assert_eq!(child.deadline(), parent.deadline());

        let child = parent.with_timeout(Duration::from_millis(1));
        assert!(child.deadline() < parent.deadline());
    }

    #[tokio::test]
    async fn test_parent_cancel_reaches_child_only_downwards() {
        let parent = Context::new();
        let child = parent.with_timeout(Duration::from_secs(10));

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let child = parent.with_timeout(Duration::from_secs(10));
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn test_done_resolves_on_deadline() {
        let ctx = Context::new().with_timeout(Duration::from_millis(20));
        ctx.done().await;
        assert!(ctx.is_expired());
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_run_stops_slow_future() {
        let ctx = Context::new().with_timeout(Duration::from_millis(20));
        let result = ctx.run(tokio::time::sleep(Duration::from_secs(5))).await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));

        let ctx = Context::new();
        assert_eq!(ctx.run(async { 7 }).await.unwrap(), 7);
    }
}
