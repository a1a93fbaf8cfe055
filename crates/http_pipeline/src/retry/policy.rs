// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;

use super::backoff::BackoffOptions;
use super::{Attempt, Recovery, RecoveryInfo, RecoveryKind, RetryOptions};
use crate::{Next, Request, ResendCount, Response, Result};

/// Sends a request again when the outcome of an attempt is transient.
///
/// Every attempt runs the per-retry segment of the pipeline again, so each resend gets its
/// own span and duration sample. Before each resend the policy stores the attempt's
/// [`ResendCount`] in the request context, where the instrumentation picks it up. The count
/// is removed again when the call returns.
///
/// The default classifier retries transient transport errors and the status codes 408, 429,
/// 500, 502, 503 and 504. A delay requested by the server through `Retry-After` takes
/// precedence over the backoff. When all attempts are used up, the last outcome is returned
/// unchanged.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use http_pipeline::retry::{Backoff, RecoveryInfo, RetryOptions, RetryPolicy};
///
/// let retry = RetryPolicy::new(
///     RetryOptions::new()
///         .max_retries(5)
///         .backoff(Backoff::Linear)
///         .base_delay(Duration::from_millis(100)),
/// )
/// .recovery_with(|outcome, _attempt| match outcome {
///     Ok(response) if response.status().is_server_error() => RecoveryInfo::retry(),
///     _ => RecoveryInfo::never(),
/// });
/// # drop(retry);
/// ```
#[derive(Clone, Debug, Default)]
pub struct RetryPolicy {
    shared: Arc<RetryShared>,
}

#[derive(Clone, Debug)]
struct RetryShared {
    options: RetryOptions,
    max_attempts: u32,
    backoff: BackoffOptions,
    should_recover: ShouldRecover,
    sleep: Sleep,
}

impl Default for RetryShared {
    fn default() -> Self {
        Self::new(RetryOptions::default())
    }
}

impl RetryShared {
    fn new(options: RetryOptions) -> Self {
        Self {
            max_attempts: options.max_attempts(),
            backoff: options.backoff_options(),
            options,
            should_recover: ShouldRecover::new(|outcome, _| outcome.recovery()),
            sleep: Sleep::new(|delay| tokio::time::sleep(delay).boxed()),
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy with the given options and the default classifier.
    #[must_use]
    pub fn new(options: RetryOptions) -> Self {
        Self {
            shared: Arc::new(RetryShared::new(options)),
        }
    }

    /// Replaces the classifier that decides whether an outcome is retried.
    ///
    /// Only [`RecoveryKind::Retry`] leads to another attempt. A delay set on the returned
    /// [`RecoveryInfo`] replaces the backoff delay for that retry.
    #[must_use]
    pub fn recovery_with<F>(mut self, classify: F) -> Self
    where
        F: Fn(&Result<Response>, Attempt) -> RecoveryInfo + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.shared).should_recover = ShouldRecover::new(classify);
        self
    }

    /// Replaces the function used to wait between attempts.
    ///
    /// **Default**: [`tokio::time::sleep`], which requires a Tokio runtime with the time
    /// driver enabled.
    #[must_use]
    pub fn sleep_with<F, Fut>(mut self, sleep: F) -> Self
    where
        F: Fn(Duration) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Arc::make_mut(&mut self.shared).sleep = Sleep::new(move |delay| sleep(delay).boxed());
        self
    }

    /// Returns the options this policy was created with.
    #[must_use]
    pub fn options(&self) -> &RetryOptions {
        &self.shared.options
    }

    pub(crate) fn process<'a>(&'a self, request: &'a mut Request, next: Next<'a>) -> BoxFuture<'a, Result<Response>> {
        self.execute(request, next).boxed()
    }

    #[cfg_attr(test, mutants::skip)] // causes test timeouts
    async fn execute(&self, request: &mut Request, next: Next<'_>) -> Result<Response> {
        let shared = &*self.shared;

        // a count left over from an earlier call must not leak into the first attempt
        _ = request.context_mut().remove::<ResendCount>();

        let mut attempt = Attempt::first(shared.max_attempts);
        let mut delays = shared.backoff.delays();

        loop {
            let outcome = next.process(request).await;

            match shared.evaluate_attempt(request, outcome, attempt, &mut delays) {
                ControlFlow::Continue(state) => {
                    if !state.delay.is_zero() {
                        shared.sleep.call(state.delay).await;
                    }

                    _ = request.context_mut().insert(ResendCount(state.attempt.index()));
                    attempt = state.attempt;
                }
                ControlFlow::Break(outcome) => {
                    _ = request.context_mut().remove::<ResendCount>();
                    return outcome;
                }
            }
        }
    }
}

impl RetryShared {
    fn evaluate_attempt(
        &self,
        request: &Request,
        outcome: Result<Response>,
        attempt: Attempt,
        delays: &mut impl Iterator<Item = Duration>,
    ) -> ControlFlow<Result<Response>, ContinueRetry> {
        let recovery = self.should_recover.call(&outcome, attempt);

        if recovery.kind() != RecoveryKind::Retry {
            return ControlFlow::Break(outcome);
        }

        let Some(next_attempt) = attempt.increment(self.max_attempts) else {
            return ControlFlow::Break(outcome);
        };

        let delay = self.compute_retry_delay(&recovery, delays);
        emit_retry(request, &outcome, next_attempt, delay);

        ControlFlow::Continue(ContinueRetry {
            attempt: next_attempt,
            delay,
        })
    }

    fn compute_retry_delay(&self, recovery: &RecoveryInfo, delays: &mut impl Iterator<Item = Duration>) -> Duration {
        let backoff_delay = delays.next().unwrap_or(Duration::ZERO);
        recovery.get_delay().map_or(backoff_delay, |delay| self.backoff.clamp(delay))
    }
}

fn emit_retry(request: &Request, outcome: &Result<Response>, next_attempt: Attempt, delay: Duration) {
    let reason = match outcome {
        Ok(response) => response.status().as_str().to_owned(),
        Err(error) => error.type_name().to_owned(),
    };

    tracing::event!(
        name: "http_pipeline.retry",
        tracing::Level::WARN,
        http.request.method = %request.method(),
        http.request.resend_count = next_attempt.index(),
        retry.attempt.is_last = next_attempt.is_last(),
        retry.delay = delay.as_secs_f32(),
        retry.reason = %reason,
    );
}

struct ContinueRetry {
    attempt: Attempt,
    delay: Duration,
}

#[derive(Clone)]
struct ShouldRecover(Arc<dyn Fn(&Result<Response>, Attempt) -> RecoveryInfo + Send + Sync>);

impl ShouldRecover {
    fn new<F>(classify: F) -> Self
    where
        F: Fn(&Result<Response>, Attempt) -> RecoveryInfo + Send + Sync + 'static,
    {
        Self(Arc::new(classify))
    }

    fn call(&self, outcome: &Result<Response>, attempt: Attempt) -> RecoveryInfo {
        (self.0)(outcome, attempt)
    }
}

impl Debug for ShouldRecover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShouldRecover").finish()
    }
}

#[derive(Clone)]
struct Sleep(Arc<dyn Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync>);

impl Sleep {
    fn new<F>(sleep: F) -> Self
    where
        F: Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        Self(Arc::new(sleep))
    }

    fn call(&self, delay: Duration) -> BoxFuture<'static, ()> {
        (self.0)(delay)
    }
}

impl Debug for Sleep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sleep").finish()
    }
}
