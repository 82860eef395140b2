//! Retry policy and the request state machine.
//!
//! Epistemic foundation:
//! - I^B: Provider availability is unknowable → bounded retry with jitter
//! - K_i: Transitions are driven only by the classified outcome of an attempt

use crate::client::{Classification, ErrorKind, ModelRoster};
use crate::models::RetryConfig;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

/// Exponential backoff with proportional uniform jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt on one model
    pub max_retries: u32,
    pub base: Duration,
    pub growth: f64,
    pub jitter_factor: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base: Duration::from_millis(config.base_delay_ms),
            growth: config.growth,
            jitter_factor: config.jitter_factor,
        }
    }

    /// Backoff before retry number `attempt + 1`:
    /// `base * growth^attempt + uniform(0, factor * base * growth^attempt)`.
    pub fn delay<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let (low, high) = self.delay_bounds(attempt);
        if high <= low {
            return low;
        }
        let secs = rng.gen_range(low.as_secs_f64()..=high.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Inclusive range `delay` draws from.
    pub fn delay_bounds(&self, attempt: u32) -> (Duration, Duration) {
        let backoff = self.base.as_secs_f64() * self.growth.powi(attempt as i32);
        let backoff = if backoff.is_finite() { backoff.max(0.0) } else { 0.0 };
        let jitter = (self.jitter_factor.max(0.0) * backoff).max(0.0);
        (
            Duration::from_secs_f64(backoff),
            Duration::from_secs_f64(backoff + jitter),
        )
    }

    /// Whether another attempt on the same model is allowed after `attempt` failed.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Where a single `evaluate` call stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryState {
    /// Send to `model`; `attempt` counts prior failures on that model
    Trying { model: String, attempt: u32 },
    /// Terminal failure
    Failed(ErrorKind),
    /// Terminal success (curated or rejected by the model)
    Succeeded,
}

impl RetryState {
    pub fn start(roster: &ModelRoster) -> Self {
        Self::Trying {
            model: roster.current_model().to_string(),
            attempt: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Trying { .. })
    }

    /// Advance the machine after an attempt produced `outcome`.
    ///
    /// Rate limiting fails over to the next roster model with a fresh attempt
    /// count; on the last model it behaves like a transient error.
    pub fn next(
        self,
        outcome: &Classification,
        roster: &mut ModelRoster,
        policy: &RetryPolicy,
    ) -> RetryState {
        let (model, attempt) = match self {
            Self::Trying { model, attempt } => (model, attempt),
            terminal => return terminal,
        };

        match outcome {
            Classification::Curated(_) | Classification::Rejected => Self::Succeeded,
            Classification::RateLimited => {
                if roster.mark_rate_limited() {
                    Self::Trying {
                        model: roster.current_model().to_string(),
                        attempt: 0,
                    }
                } else {
                    Self::backoff(model, attempt, policy)
                }
            }
            Classification::Error(kind) if kind.is_transient() => {
                debug!(model = %model, attempt, error = %kind, "Transient AI error");
                Self::backoff(model, attempt, policy)
            }
            Classification::Error(kind) => Self::Failed(kind.clone()),
        }
    }

    fn backoff(model: String, attempt: u32, policy: &RetryPolicy) -> RetryState {
        if policy.allows_retry(attempt) {
            Self::Trying {
                model,
                attempt: attempt + 1,
            }
        } else {
            warn!(model = %model, attempts = attempt + 1, "Retries exhausted");
            Self::Failed(ErrorKind::MaxRetriesExceeded)
        }
    }
}
