use crate::error::PipelineError;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation and deadline for one `process_stream` call.
#[derive(Debug, Clone, Default)]
pub struct StreamContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl StreamContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Give up at `deadline`. An earlier deadline already set is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Give up after `timeout`. A timeout too large to represent sets no deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Context cancelled together with `self`, but cancellable on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Resolves once the context is cancelled or its deadline passes, with the cause.
    pub async fn done(&self) -> PipelineError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.token.cancelled() => PipelineError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => PipelineError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                PipelineError::Cancelled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_resolves_done() {
        let ctx = StreamContext::new();
        assert!(!ctx.is_cancelled());
        ctx.cancel();
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.done().await, PipelineError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_resolves_done() {
        let ctx = StreamContext::new().with_timeout(Duration::from_millis(50));
        assert!(matches!(ctx.done().await, PipelineError::DeadlineExceeded));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn child_follows_parent_but_not_the_reverse() {
        let parent = StreamContext::new();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn unbounded_timeout_sets_no_deadline() {
        let ctx = StreamContext::new().with_timeout(Duration::MAX);
        assert_eq!(ctx.deadline(), None);
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn earlier_deadline_wins() {
        let now = Instant::now();
        let ctx = StreamContext::new()
            .with_deadline(now + Duration::from_secs(1))
            .with_deadline(now + Duration::from_secs(5));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(1)));
    }
}
