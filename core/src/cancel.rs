//! Cancellation-aware future helpers.

use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Error returned when the token wins the race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("operation cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Race a future against a `CancellationToken`.
///
/// Returns `Ok(output)` if the future completes first, `Err(Cancelled)`
/// if the token is cancelled first. The future is dropped on
/// cancellation, so any in-flight I/O it owns is torn down with it.
#[async_trait]
pub trait OrCancel: Sized {
    type Output;

    async fn or_cancel(self, token: &CancellationToken) -> Result<Self::Output, Cancelled>;
}

#[async_trait]
impl<F> OrCancel for F
where
    F: Future + Send,
    F::Output: Send,
{
    type Output = F::Output;

    async fn or_cancel(self, token: &CancellationToken) -> Result<Self::Output, Cancelled> {
        tokio::select! {
            _ = token.cancelled() => Err(Cancelled),
            output = self => Ok(output),
        }
    }
}
