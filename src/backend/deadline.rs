/*!
 * Deadline-bound cancellation.
 *
 * A `Deadline` pairs a cancellation token with an absolute expiry. Every
 * awaited network call of one backend operation runs through `run`, so
 * either firing the token or reaching the expiry aborts whatever request
 * is in flight.
 */

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::BackendError;

#[derive(Debug, Clone)]
pub struct Deadline {
    token: CancellationToken,
    expires_at: Instant,
    limit: Duration,
}

impl Deadline {
    /// Deadline `limit` from now bound to an existing token
    pub fn with_token(limit: Duration, token: CancellationToken) -> Self {
        Self {
            token,
            expires_at: Instant::now() + limit,
            limit,
        }
    }

    fn timeout_error(&self) -> BackendError {
        BackendError::Timeout(self.limit.as_secs())
    }

    /// Run `future` unless the token fires or the deadline passes first
    pub async fn run<F, T>(&self, future: F) -> Result<T, BackendError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(BackendError::Cancelled),
            _ = tokio::time::sleep_until(self.expires_at) => {
                self.token.cancel();
                Err(self.timeout_error())
            }
            result = future => result,
        }
    }

    /// Sleep for `duration`, failing early on cancellation or expiry
    pub async fn sleep(&self, duration: Duration) -> Result<(), BackendError> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}
