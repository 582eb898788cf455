//! Per-call cancellation and deadline.
//!
//! Every service operation takes a [`CallContext`]. Work runs under
//! `tokio::select!` against the context, so cancelling it (or letting the
//! deadline pass) drops the in-flight store calls and returns
//! [`CoreError::Cancelled`] / [`CoreError::DeadlineExceeded`] instead of a
//! partial answer.

use std::{future::Future, time::Duration};

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that never expires and is cancelled only explicitly.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { token: CancellationToken::new(), deadline: Some(Instant::now() + timeout) }
    }

    /// Derive a context cancelled together with `self`, with an optional
    /// tighter deadline. The earlier of the two deadlines wins.
    pub fn child(&self, timeout: Option<Duration>) -> Self {
        let own = timeout.map(|t| Instant::now() + t);
        let deadline = match (self.deadline, own) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self { token: self.token.child_token(), deadline }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn has_deadline(&self) -> bool {
        self.deadline.is_some()
    }

    /// Fail fast when the call is already over.
    pub fn check(&self) -> CoreResult<()> {
        if self.token.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(CoreError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Run `fut` until it completes, the context is cancelled, or the
    /// deadline passes, whichever comes first.
    pub async fn run<T, E, F>(&self, fut: F) -> CoreResult<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<CoreError>,
    {
        self.check()?;
        let expiry = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(CoreError::Cancelled),
            _ = expiry => Err(CoreError::DeadlineExceeded),
            result = fut => result.map_err(Into::into),
        }
    }
}
