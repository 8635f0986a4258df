//! Async utilities for cancellation-aware and deadline-bound futures.
//!
//! - [`OrCancelExt`] races a future against a `CancellationToken`.
//! - [`Deadline`] models a caller deadline with a grace window for work that
//!   was already in flight when the deadline passed.

mod deadline;

pub use deadline::Deadline;

use async_trait::async_trait;
use std::future::Future;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelErr {
    Cancelled,
}

/// Extension trait for making futures cancellable.
#[async_trait]
pub trait OrCancelExt: Sized {
    type Output;

    /// Race this future against the cancellation token.
    async fn or_cancel(self, token: &CancellationToken) -> Result<Self::Output, CancelErr>;
}

#[async_trait]
impl<F> OrCancelExt for F
where
    F: Future + Send,
    F::Output: Send,
{
    type Output = F::Output;

    async fn or_cancel(self, token: &CancellationToken) -> Result<Self::Output, CancelErr> {
        tokio::select! {
            _ = token.cancelled() => Err(CancelErr::Cancelled),
            res = self => Ok(res),
        }
    }
}
