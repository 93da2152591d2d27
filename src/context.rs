//! Per-call deadline and cancellation.

use crate::error::{AppError, AppResult};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Deadline and cancellation token carried through one façade call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl CallContext {
    pub fn new(timeout: Option<Duration>, cancel: CancellationToken) -> Self {
        Self {
            deadline: timeout.map(|t| Instant::now() + t),
            cancel,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(Some(timeout), CancellationToken::new())
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Time left before the deadline; `None` when the call is unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fails once the call has been cancelled or its deadline has passed.
    pub fn checkpoint(&self) -> AppResult<()> {
        if self.cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        match self.remaining() {
            Some(left) if left.is_zero() => Err(AppError::Timeout(
                "deadline exceeded before the operation completed".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Clamp a blocking timeout to the time left on the call.
    pub fn bounded(&self, timeout: Duration) -> Duration {
        match self.remaining() {
            Some(left) => timeout.min(left),
            None => timeout,
        }
    }
}
