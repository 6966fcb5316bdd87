//! Routing provider seam and the rate-limit retry policy.
//!
//! The pipeline never talks to a routing service directly. It receives an
//! explicit [`RoutingProvider`] handle from the caller and issues requests
//! sequentially, one in flight at a time. Rate-limited requests are retried
//! in a loop after the provider's cool-down.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, SakuraError};
use crate::matrix::DistanceMatrix;
use crate::Coordinate;

/// Cool-down applied when the provider does not say how long to wait.
pub const DEFAULT_COOLDOWN_SECS: u64 = 60;

/// Route geometry and length returned by a routing provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDetail {
    /// Polyline of the route, in travel order
    pub points: Vec<Coordinate>,
    /// Total route distance in meters
    pub distance: f64,
}

/// A routing service able to answer matrix and route requests.
///
/// Implementations must report rate limiting as
/// [`SakuraError::RateLimited`] and requests with too many points as
/// [`SakuraError::PointLimitExceeded`], so callers can react to each.
pub trait RoutingProvider {
    /// Travel distances in meters.
    ///
    /// With `to == None` the result is the square `from × from` matrix;
    /// otherwise it is the `from × to` block.
    fn post_matrix(
        &self,
        from: &[Coordinate],
        to: Option<&[Coordinate]>,
        profile: &str,
    ) -> Result<DistanceMatrix>;

    /// Route through `points` in the given order.
    fn post_route(&self, points: &[Coordinate], profile: &str) -> Result<RouteDetail>;
}

impl<P: RoutingProvider + ?Sized> RoutingProvider for &P {
    fn post_matrix(
        &self,
        from: &[Coordinate],
        to: Option<&[Coordinate]>,
        profile: &str,
    ) -> Result<DistanceMatrix> {
        (**self).post_matrix(from, to, profile)
    }

    fn post_route(&self, points: &[Coordinate], profile: &str) -> Result<RouteDetail> {
        (**self).post_route(points, profile)
    }
}

/// How to react to rate-limited provider calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Wait used when the provider gives no explicit cool-down.
    /// Default: 60 seconds
    pub cooldown: Duration,
    /// Maximum number of retries per request; `None` retries until the
    /// provider answers or fails with a non-transient error.
    /// Default: None
    pub max_retries: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(DEFAULT_COOLDOWN_SECS),
            max_retries: None,
        }
    }
}

impl RetryPolicy {
    /// Run `call` until it succeeds, sleeping between rate-limited attempts.
    ///
    /// Non-transient errors are returned immediately with `context()`
    /// attached.
    pub fn run<T>(
        &self,
        context: impl Fn() -> String,
        mut call: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        let mut retries: u32 = 0;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(SakuraError::RateLimited { retry_after }) => {
                    retries += 1;
                    if let Some(max) = self.max_retries {
                        if retries > max {
                            warn!(
                                "[RetryPolicy] giving up on {} after {} rate-limited attempts",
                                context(),
                                retries
                            );
                            return Err(SakuraError::ProviderError {
                                message: format!("still rate limited after {} retries", max),
                                status_code: Some(429),
                                context: Some(context()),
                            });
                        }
                    }
                    let wait = retry_after.unwrap_or(self.cooldown);
                    info!(
                        "[RetryPolicy] rate limited on {}, retry {} after {:?}",
                        context(),
                        retries,
                        wait
                    );
                    std::thread::sleep(wait);
                }
                Err(e) => return Err(e.with_context(context())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn instant_policy() -> RetryPolicy {
        RetryPolicy {
            cooldown: Duration::ZERO,
            max_retries: None,
        }
    }

    #[test]
    fn test_retries_until_success() {
        let calls = Cell::new(0);
        let result = instant_policy().run(
            || "block 0".to_string(),
            || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err(SakuraError::RateLimited {
                        retry_after: Some(Duration::ZERO),
                    })
                } else {
                    Ok(42)
                }
            },
        );
        assert_eq!(result, Ok(42));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_persistent_error_gets_context() {
        let result: Result<()> = instant_policy().run(
            || "rows 0..3".to_string(),
            || Err(SakuraError::provider("outage")),
        );
        match result {
            Err(SakuraError::ProviderError { context, .. }) => {
                assert_eq!(context.as_deref(), Some("rows 0..3"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bounded_retries() {
        let policy = RetryPolicy {
            cooldown: Duration::ZERO,
            max_retries: Some(2),
        };
        let calls = Cell::new(0);
        let result: Result<()> = policy.run(
            || "pair 0-1".to_string(),
            || {
                calls.set(calls.get() + 1);
                Err(SakuraError::RateLimited { retry_after: None })
            },
        );
        assert!(matches!(
            result,
            Err(SakuraError::ProviderError {
                status_code: Some(429),
                ..
            })
        ));
        assert_eq!(calls.get(), 3);
    }
}
