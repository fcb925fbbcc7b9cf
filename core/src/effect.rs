//! Effects: build-time transformations applied to every generated fetcher.
//!
//! An effect receives the original [`Fetcher`] and the [`EffectContext`]
//! naming the endpoint it serves, and returns the fetcher to install. It
//! may call the original any number of times, rewrite requests and
//! replies, or never call it at all. Whatever it returns, `make_api`
//! re-attaches the original fetcher's abort handle, so `abort()` on the
//! installed fetcher always reaches the real in-flight request.

use std::time::{Duration, Instant};

use tracing::{debug, warn};
use url::Url;

use crate::fetcher::{AbortHandle, Fetcher, Request};
use crate::http::HttpMethod;

/// Identifies the fetcher an effect is wrapping.
#[derive(Debug, Clone)]
pub struct EffectContext {
    pub base_url: Url,
    pub endpoint: String,
    pub method: HttpMethod,
    /// The abort handle the installed fetcher will expose.
    pub abort: AbortHandle,
}

/// A transformation over fetchers, applied once per (endpoint, method)
/// when the API is built.
///
/// Closures taking `(Fetcher, &EffectContext)` are effects:
///
/// ```
/// use typed_api::{EffectContext, Fetcher, Request};
///
/// let add_version = |fetcher: Fetcher, _: &EffectContext| {
///     Fetcher::from_fn(move |request: Request| fetcher.call(request.header("x-api-version", "2")))
/// };
/// # fn assert_effect<E: typed_api::Effect>(_: &E) {}
/// # assert_effect(&add_version);
/// ```
pub trait Effect: Send + Sync {
    fn apply(&self, fetcher: Fetcher, context: &EffectContext) -> Fetcher;
}

impl<F> Effect for F
where
    F: Fn(Fetcher, &EffectContext) -> Fetcher + Send + Sync,
{
    fn apply(&self, fetcher: Fetcher, context: &EffectContext) -> Fetcher {
        self(fetcher, context)
    }
}

/// Two effects applied in sequence; see [`EffectExt::then`].
#[derive(Debug, Clone)]
pub struct Chain<A, B> {
    first: A,
    second: B,
}

impl<A: Effect, B: Effect> Effect for Chain<A, B> {
    fn apply(&self, fetcher: Fetcher, context: &EffectContext) -> Fetcher {
        self.second.apply(self.first.apply(fetcher, context), context)
    }
}

pub trait EffectExt: Effect + Sized {
    /// Applies `self` first and wraps the result with `next`, so `next`
    /// sees each call before `self` does.
    fn then<B: Effect>(self, next: B) -> Chain<Self, B> {
        Chain {
            first: self,
            second: next,
        }
    }
}

impl<E: Effect> EffectExt for E {}

/// Backoff settings for [`retry`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    fn next_delay(&self, delay: Duration) -> Duration {
        std::cmp::min(delay.mul_f64(self.multiplier), self.max_delay)
    }
}

/// Retries retryable failures with exponential backoff.
///
/// Only errors for which [`ApiError::is_retryable`] holds are retried. An
/// aborted attempt resolves the call immediately, and so does an abort that
/// arrives while waiting between attempts.
///
/// [`ApiError::is_retryable`]: crate::ApiError::is_retryable
pub fn retry(policy: RetryPolicy) -> Retry {
    Retry { policy }
}

#[derive(Debug, Clone)]
pub struct Retry {
    policy: RetryPolicy,
}

impl Effect for Retry {
    fn apply(&self, fetcher: Fetcher, context: &EffectContext) -> Fetcher {
        let policy = self.policy.clone();
        let context = context.clone();

        Fetcher::from_fn(move |request: Request| {
            let first = fetcher.call(request.clone());
            let fetcher = fetcher.clone();
            let policy = policy.clone();
            let context = context.clone();
            async move {
                let mut delay = policy.initial_delay;
                let mut attempt = 0;
                let mut outcome = first.await;
                loop {
                    match outcome {
                        Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                            attempt += 1;
                            warn!(
                                endpoint = %context.endpoint,
                                method = %context.method,
                                attempt,
                                ?delay,
                                error = %err,
                                "retrying request"
                            );
                            if !backoff(&context.abort, delay).await {
                                debug!(endpoint = %context.endpoint, method = %context.method, "retry aborted");
                                return Ok(None);
                            }
                            delay = policy.next_delay(delay);
                            outcome = fetcher.call(request.clone()).await;
                        }
                        outcome => return outcome,
                    }
                }
            }
        })
    }
}

/// Sleeps for `delay` with `abort` armed. `false` when aborted.
async fn backoff(abort: &AbortHandle, delay: Duration) -> bool {
    let mut armed = abort.arm();
    tokio::select! {
        biased;
        Ok(()) = &mut armed.cancelled => false,
        () = tokio::time::sleep(delay) => true,
    }
}

/// Sends `authorization: Bearer <token>` with every call.
pub fn bearer_auth(token: impl Into<String>) -> BearerAuth {
    BearerAuth {
        header: format!("Bearer {}", token.into()),
    }
}

#[derive(Clone)]
pub struct BearerAuth {
    header: String,
}

impl std::fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuth").finish_non_exhaustive()
    }
}

impl Effect for BearerAuth {
    fn apply(&self, fetcher: Fetcher, _context: &EffectContext) -> Fetcher {
        let header = self.header.clone();
        Fetcher::from_fn(move |request: Request| {
            fetcher.call(request.header("authorization", header.clone()))
        })
    }
}

/// Logs the start and outcome of every call.
pub fn trace_calls() -> TraceCalls {
    TraceCalls
}

#[derive(Debug, Clone, Copy)]
pub struct TraceCalls;

impl Effect for TraceCalls {
    fn apply(&self, fetcher: Fetcher, context: &EffectContext) -> Fetcher {
        let context = context.clone();
        Fetcher::from_fn(move |request: Request| {
            debug!(endpoint = %context.endpoint, method = %context.method, "call started");
            let started = Instant::now();
            let pending = fetcher.call(request);
            let context = context.clone();
            async move {
                let outcome = pending.await;
                let elapsed_ms = started.elapsed().as_millis() as u64;
                match &outcome {
                    Ok(Some(_)) => {
                        debug!(endpoint = %context.endpoint, method = %context.method, elapsed_ms, "call succeeded")
                    }
                    Ok(None) => {
                        debug!(endpoint = %context.endpoint, method = %context.method, elapsed_ms, "call aborted")
                    }
                    Err(err) => {
                        warn!(endpoint = %context.endpoint, method = %context.method, elapsed_ms, error = %err, "call failed")
                    }
                }
                outcome
            }
        })
    }
}
