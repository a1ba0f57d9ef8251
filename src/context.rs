//! Deadlines and cancellation for database calls.
//!
//! A [`Context`] travels with every `*_context` operation. The operation's
//! future is raced against the deadline and the cancellation signal and is
//! dropped, aborting the network call, as soon as either fires.
//!
//! ```rust,ignore
//! let ctx = Context::background().with_timeout(Duration::from_secs(2));
//! let users: Vec<User> = db.select_context(&ctx, "SELECT * FROM users", args![]).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::error::{SqlDbError, SqlDbResult};

/// Deadline and cancellation carrier.
///
/// Cloning is cheap; children derived with [`Context::with_cancel`] or
/// [`Context::with_timeout`] also end when their parent ends.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    token: Option<CancellationToken>,
}

/// Cancels the context it was created with, and every context derived from it.
#[derive(Debug)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Context {
    /// A context that never ends.
    pub fn background() -> Self {
        Self::default()
    }

    /// Child context that ends at `deadline` (or earlier, with its parent).
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        Self {
            deadline: Some(deadline),
            token: self.token.clone(),
        }
    }

    /// Child context that ends after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Child context plus the handle that cancels it.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let token = match &self.token {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        (
            Self {
                deadline: self.deadline,
                token: Some(token.clone()),
            },
            CancelHandle { token },
        )
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(|t| t.is_cancelled())
    }

    /// The error this context ends with right now, if it has ended.
    pub fn err(&self) -> Option<SqlDbError> {
        if self.is_cancelled() {
            Some(SqlDbError::Cancelled)
        } else if self.deadline.is_some_and(|d| d <= Instant::now()) {
            Some(SqlDbError::DeadlineExceeded)
        } else {
            None
        }
    }

    async fn cancelled(&self) {
        match &self.token {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    }

    async fn expired(&self) {
        match self.deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    /// Run `fut` until it completes or this context ends.
    pub async fn run<F: Future>(&self, fut: F) -> SqlDbResult<F::Output> {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            out = fut => Ok(out),
            _ = self.cancelled() => Err(SqlDbError::Cancelled),
            _ = self.expired() => Err(SqlDbError::DeadlineExceeded),
        }
    }
}
