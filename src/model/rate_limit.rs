//! Rate limiting and retry around outbound model calls
//!
//! Every attempt takes one token from a shared bucket before it reaches the
//! transport. A missing token is [`Error::RateLimited`] and is waited out with
//! a constant backoff, without limit. Any other failure is retried with the
//! same constant backoff until `max_retries` attempts have been made.

use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter, clock::DefaultClock, state::InMemoryState, state::NotKeyed};

use crate::{Error, Result};

/// Call budget and retry discipline for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Calls allowed per `period`
    pub calls: NonZeroU32,
    /// Length of the budget window
    pub period: Duration,
    /// Underlying attempts made on transport failures before giving up
    pub max_retries: u32,
    /// Constant delay between attempts
    pub backoff: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            calls: NonZeroU32::MIN,
            period: Duration::from_secs(2),
            max_retries: 5,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RateLimitPolicy {
    fn quota(&self) -> Result<Quota> {
        if self.period.is_zero() {
            return Err(Error::Config(
                "rate limit period must be greater than zero".to_string(),
            ));
        }
        let replenish = self.period / self.calls.get();
        Quota::with_period(replenish)
            .map(|q| q.allow_burst(self.calls))
            .ok_or_else(|| {
                Error::Config(format!(
                    "rate limit replenish interval is zero: {} calls per {:?} is finer than 1ns",
                    self.calls, self.period
                ))
            })
    }
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Decorates a transport call with a token bucket and layered retries
///
/// Shared through an [`Arc`] so every caller cloned from it draws from the
/// same bucket.
pub struct RateLimitedCaller {
    limiter: DirectLimiter,
    policy: RateLimitPolicy,
}

/// Caller shared between tasks
pub type SharedCaller = Arc<RateLimitedCaller>;

impl RateLimitedCaller {
    /// Create a caller for `policy`
    ///
    /// # Errors
    ///
    /// Returns error if the policy period, or the interval between tokens, is zero
    pub fn new(policy: RateLimitPolicy) -> Result<Self> {
        let limiter = RateLimiter::direct(policy.quota()?);
        Ok(Self { limiter, policy })
    }

    /// Create a caller ready to be shared
    ///
    /// # Errors
    ///
    /// Returns error if the policy period is zero
    pub fn shared(policy: RateLimitPolicy) -> Result<SharedCaller> {
        Self::new(policy).map(Arc::new)
    }

    #[must_use]
    pub const fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Run `op` under the rate limit and retry policy
    ///
    /// # Errors
    ///
    /// Returns [`Error::CallFailed`] carrying the last error once every
    /// allowed attempt has failed
    pub async fn call<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.policy.max_retries.max(1);
        let mut attempts = 0;

        loop {
            let outcome = match self.limiter.check() {
                Ok(()) => op().await,
                Err(_) => Err(Error::RateLimited),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_rate_limited() => {
                    tracing::trace!("rate limited, backing off");
                }
                Err(e) => {
                    attempts += 1;
                    if attempts >= max_attempts {
                        tracing::error!(attempts, error = %e, "model call failed");
                        return Err(Error::CallFailed {
                            attempts,
                            source: Box::new(e),
                        });
                    }
                    tracing::warn!(attempt = attempts, error = %e, "model call failed, retrying");
                }
            }

            tokio::time::sleep(self.policy.backoff).await;
        }
    }
}
