//! Randomized exponential backoff for poll scheduling
//!
//! Computes the delay before the next poll from recent outcome history:
//! finding work snaps the delay back to the minimum, while consecutive empty
//! polls grow it geometrically (with jitter) until it saturates at the
//! maximum.

use std::time::Duration;

use rand::Rng;

/// Jitter band applied around the geometric term (plus or minus 20%).
const RANDOMIZATION_FACTOR: f64 = 0.2;

/// Error constructing a backoff strategy
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackoffError {
    /// Minimum interval exceeds maximum interval
    #[error("minimum interval {minimum:?} must not be greater than maximum interval {maximum:?}")]
    InvertedBounds {
        minimum: Duration,
        maximum: Duration,
    },
}

/// Randomized exponential backoff strategy
///
/// Tracks the current interval and a backoff exponent (the count of
/// consecutive no-work polls). Each no-work call computes
/// `minimum + jitter * 2^(exponent - 1) * delta` with `jitter` drawn
/// uniformly from `[0.8, 1.2]`, until the interval saturates at the maximum.
/// A call reporting work resets the interval to the minimum.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use groupq::timer::RandomizedExponentialBackoff;
///
/// let mut backoff = RandomizedExponentialBackoff::new(
///     Duration::from_secs(2),
///     Duration::from_secs(60),
/// ).unwrap();
///
/// // First empty poll waits exactly the minimum
/// assert_eq!(backoff.next_delay(false), Duration::from_secs(2));
///
/// // Finding work snaps back to the minimum
/// backoff.next_delay(false);
/// assert_eq!(backoff.next_delay(true), Duration::from_secs(2));
/// ```
#[derive(Debug)]
pub struct RandomizedExponentialBackoff {
    minimum_interval: Duration,
    maximum_interval: Duration,
    delta_backoff: Duration,
    current_interval: Duration,
    backoff_exponent: u32,
}

impl RandomizedExponentialBackoff {
    /// Create a strategy whose backoff delta equals the minimum interval
    pub fn new(
        minimum_interval: Duration,
        maximum_interval: Duration,
    ) -> Result<Self, BackoffError> {
        Self::with_delta(minimum_interval, maximum_interval, minimum_interval)
    }

    /// Create a strategy with an explicit backoff delta
    pub fn with_delta(
        minimum_interval: Duration,
        maximum_interval: Duration,
        delta_backoff: Duration,
    ) -> Result<Self, BackoffError> {
        if minimum_interval > maximum_interval {
            return Err(BackoffError::InvertedBounds {
                minimum: minimum_interval,
                maximum: maximum_interval,
            });
        }

        Ok(Self {
            minimum_interval,
            maximum_interval,
            delta_backoff,
            current_interval: Duration::ZERO,
            backoff_exponent: 0,
        })
    }

    /// Compute the delay before the next poll
    ///
    /// `found_work` reports whether any work was found since the previous
    /// call. True resets the interval to the configured minimum; false grows
    /// it toward the maximum.
    pub fn next_delay(&mut self, found_work: bool) -> Duration {
        if found_work {
            self.current_interval = self.minimum_interval;
            self.backoff_exponent = 1;
        } else if self.current_interval != self.maximum_interval {
            let mut candidate = self.minimum_interval;

            if self.backoff_exponent > 0 {
                let jitter = rand::thread_rng().gen_range(
                    (1.0 - RANDOMIZATION_FACTOR)..=(1.0 + RANDOMIZATION_FACTOR),
                );
                let backoff_secs = jitter
                    * 2f64.powi(self.backoff_exponent as i32 - 1)
                    * self.delta_backoff.as_secs_f64();
                candidate += Duration::from_secs_f64(backoff_secs);
            }

            if candidate < self.maximum_interval {
                self.current_interval = candidate;
                self.backoff_exponent += 1;
            } else {
                // Saturated: exponent growth stops until a success resets it
                self.current_interval = self.maximum_interval;
            }
        }

        self.current_interval
    }

    /// The configured minimum interval
    pub fn minimum_interval(&self) -> Duration {
        self.minimum_interval
    }

    /// The configured maximum interval
    pub fn maximum_interval(&self) -> Duration {
        self.maximum_interval
    }
}
