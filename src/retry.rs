//! Bounded retries and cancellation for remote calls.
//!
//! Every controller operation runs under an [`OperationContext`] carrying a
//! cancellation token and an optional deadline. Reads that lose the race
//! against cancellation fail with [`ProviderError::DeadlineExceeded`].
//! Mutations are different: once a create, update or delete has been sent,
//! abandoning it leaves the remote state unknown, so the caller gets
//! [`ProviderError::UnknownState`] instead.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ProviderError;

/// Exponential backoff bounded by a wall-clock timeout.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOptions {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// Growth factor between attempts.
    pub multiplier: f64,
    /// Total time budget across all attempts.
    pub timeout: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            timeout: Duration::from_secs(120),
        }
    }
}

impl RetryOptions {
    /// Create retry options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the first delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the delay cap.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the growth factor.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the total time budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(64) as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        if !delay.is_finite() || delay >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(delay)
        }
    }
}

/// Cancellation and deadline for one lifecycle operation.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl OperationContext {
    /// A context that is never cancelled and has no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an existing cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Expire `timeout` from now. A timeout past the clock's range means no
    /// deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    /// The cancellation token; cancel it to abort the operation.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the operation has been cancelled or is past its deadline.
    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the operation is cancelled or past its deadline.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.cancel.cancelled() => {},
                    _ = tokio::time::sleep_until(deadline) => {},
                }
            },
            None => self.cancel.cancelled().await,
        }
    }

    /// Run a read-only call, abandoning it on cancellation.
    pub async fn read<T, F>(&self, what: &str, call: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        if self.is_done() {
            return Err(cancelled(what));
        }
        tokio::select! {
            biased;
            _ = self.done() => Err(cancelled(what)),
            result = call => result,
        }
    }

    /// Run a mutating call.
    ///
    /// If cancellation wins the race after the call was started, the remote
    /// outcome is unknown and [`ProviderError::UnknownState`] is returned.
    pub async fn mutate<T, F>(&self, what: &str, call: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        if self.is_done() {
            return Err(cancelled(what));
        }
        tokio::select! {
            biased;
            result = call => result,
            _ = self.done() => Err(ProviderError::UnknownState(format!(
                "{} was interrupted before the remote service answered",
                what
            ))),
        }
    }
}

fn cancelled(what: &str) -> ProviderError {
    ProviderError::DeadlineExceeded(format!("{} cancelled or past its deadline", what))
}

/// Retry `call` while `should_retry` accepts its error and the time budget
/// allows another attempt.
///
/// The last error is returned once the budget is exhausted. Each attempt runs
/// through [`OperationContext::read`], so this is meant for read-only calls.
pub async fn retry_while<T, F, Fut, P>(
    ctx: &OperationContext,
    options: &RetryOptions,
    what: &str,
    should_retry: P,
    call: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
    P: Fn(&ProviderError) -> bool,
{
    retry(ctx, options, what, should_retry, call, false).await
}

/// Like [`retry_while`], but each attempt runs through
/// [`OperationContext::mutate`].
///
/// `should_retry` must only accept errors that guarantee the mutation was not
/// applied (throttling, for example).
pub async fn retry_mutation<T, F, Fut, P>(
    ctx: &OperationContext,
    options: &RetryOptions,
    what: &str,
    should_retry: P,
    call: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
    P: Fn(&ProviderError) -> bool,
{
    retry(ctx, options, what, should_retry, call, true).await
}

async fn retry<T, F, Fut, P>(
    ctx: &OperationContext,
    options: &RetryOptions,
    what: &str,
    should_retry: P,
    mut call: F,
    mutating: bool,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
    P: Fn(&ProviderError) -> bool,
{
    let start = Instant::now();
    let mut attempt = 0u32;

    loop {
        let result = if mutating {
            ctx.mutate(what, call()).await
        } else {
            ctx.read(what, call()).await
        };
        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) if should_retry(&err) => err,
            Err(err) => return Err(err),
        };

        let delay = options.backoff(attempt);
        if start.elapsed() + delay > options.timeout {
            warn!(attempts = attempt + 1, error = %err, "{} did not converge before timeout", what);
            return Err(err);
        }

        debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying {}", what);
        tokio::select! {
            _ = ctx.done() => return Err(cancelled(what)),
            _ = tokio::time::sleep(delay) => {},
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryOptions {
        RetryOptions::new()
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(4))
            .with_timeout(Duration::from_millis(500))
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let options = RetryOptions::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(1000))
            .with_multiplier(2.0);

        assert_eq!(options.backoff(0), Duration::from_millis(100));
        assert_eq!(options.backoff(1), Duration::from_millis(200));
        assert_eq!(options.backoff(3), Duration::from_millis(800));
        assert_eq!(options.backoff(4), Duration::from_millis(1000));
        assert_eq!(options.backoff(u32::MAX), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = &AtomicU32::new(0);
        let result = retry_while(
            &OperationContext::new(),
            &fast(),
            "read-back",
            ProviderError::is_not_found,
            move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(ProviderError::not_found("not yet"))
                } else {
                    Ok("visible")
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), "visible");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = retry_while(
            &OperationContext::new(),
            &fast(),
            "read",
            ProviderError::is_not_found,
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::PermissionDenied("no".to_string()))
            },
        )
        .await;

        assert!(matches!(result, Err(ProviderError::PermissionDenied(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_returns_last_error() {
        let options = fast().with_timeout(Duration::from_millis(20));
        let result: Result<(), _> = retry_while(
            &OperationContext::new(),
            &options,
            "read-back",
            ProviderError::is_not_found,
            || async { Err(ProviderError::not_found("never")) },
        )
        .await;

        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_mutate_reports_unknown_state_on_cancel() {
        let ctx = OperationContext::new();
        let token = ctx.cancellation_token().clone();

        let result: Result<(), _> = ctx
            .mutate("creating", async move {
                token.cancel();
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(ProviderError::UnknownState(_))));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_is_not_unknown() {
        let ctx = OperationContext::new();
        ctx.cancellation_token().cancel();

        let result: Result<(), _> = ctx.mutate("deleting", async { Ok(()) }).await;
        assert!(matches!(result, Err(ProviderError::DeadlineExceeded(_))));
    }

    #[tokio::test]
    async fn test_mutation_retries_throttling() {
        let calls = &AtomicU32::new(0);
        let result = retry_mutation(
            &OperationContext::new(),
            &fast(),
            "creating",
            ProviderError::is_retryable,
            move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ProviderError::Throttled("slow down".to_string()))
                } else {
                    Ok(())
                }
            },
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_read_deadline() {
        let ctx = OperationContext::new().with_timeout(Duration::from_millis(5));
        let result: Result<(), _> = ctx
            .read("finding", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(ProviderError::DeadlineExceeded(_))));
    }

    #[test]
    fn test_unbounded_timeout_has_no_deadline() {
        let ctx = OperationContext::new().with_timeout(Duration::MAX);
        assert!(!ctx.is_done());
    }
}
