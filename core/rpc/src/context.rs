// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Call context
//!
//! A [`Context`] carries the deadline and the cancellation signal of one call.
//! Every suspension point in this crate (body reads, stream sends and
//! receives, outbound calls made by clients) goes through [`Context::run`], so
//! a blocked operation aborts as soon as the call is cancelled or its deadline
//! passes.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::RpcError;

/// Deadline and cancellation for one call
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancellation: CancellationToken,
}

impl Context {
    /// A context with no deadline, never cancelled unless asked to
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().timeout(timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self::new().deadline_at(deadline)
    }

    /// Tighten the deadline. A later deadline than the current one is ignored.
    pub fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
        self
    }

    pub fn timeout(self, timeout: Duration) -> Self {
        self.deadline_at(Instant::now() + timeout)
    }

    /// A context sharing the deadline, cancelled together with its parent
    pub fn child(&self) -> Self {
        Self {
            deadline: self.deadline,
            cancellation: self.cancellation.child_token(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when there is no deadline
    pub fn remaining_time(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_deadline_exceeded(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Fails fast if the call is already over
    pub fn check(&self) -> Result<(), RpcError> {
        if self.is_cancelled() {
            return Err(RpcError::cancelled("call cancelled"));
        }
        if self.is_deadline_exceeded() {
            return Err(RpcError::deadline_exceeded("deadline exceeded"));
        }
        Ok(())
    }

    /// Drive `fut` until it completes, the context is cancelled or the
    /// deadline passes, whichever happens first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, RpcError>
    where
        F: Future<Output = T>,
    {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(RpcError::cancelled("call cancelled")),
            _ = deadline => Err(RpcError::deadline_exceeded("deadline exceeded")),
            out = fut => Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Code;

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = Context::with_timeout(Duration::from_secs(5));
        let out = ctx.run(async { 42 }).await.unwrap();
        assert_eq!(out, 42);
        assert!(ctx.remaining_time().unwrap() <= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_deadline_exceeded() {
        let ctx = Context::with_timeout(Duration::from_millis(50));
        let err = ctx
            .run(tokio::time::sleep(Duration::from_secs(10)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::DeadlineExceeded);
        assert!(ctx.is_deadline_exceeded());
        assert_eq!(ctx.check().unwrap_err().code(), Code::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_run_cancelled() {
        let ctx = Context::new();
        let child = ctx.child();

        let waiter = tokio::spawn(async move { child.run(std::future::pending::<()>()).await });
        ctx.cancel();

        let err = waiter.await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::Cancelled);
    }

    #[test]
    fn test_deadline_only_tightens() {
        let now = Instant::now();
        let ctx = Context::with_deadline(now + Duration::from_secs(1))
            .deadline_at(now + Duration::from_secs(10));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(1)));
        assert!(Context::new().remaining_time().is_none());
    }
}
