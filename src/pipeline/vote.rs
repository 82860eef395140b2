//! Background voting on freshly published replies.
//!
//! Epistemic foundation:
//! - K_i: Vote tasks share only the publisher and the voter name
//! - B_i: The ledger accepts the vote after the delay (might not)
//! - I^B: The minimum vote interval is enforced remotely → short jittered retry

use crate::models::{PostRef, PublishError, VoteConfig};
use crate::pipeline::Publisher;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Error fragments the ledger uses for the minimum vote interval.
const INTERVAL_MARKERS: [&str; 2] = [
    "STEEM_MIN_VOTE_INTERVAL_SEC",
    "Can only vote once every 3 seconds",
];

/// How a scheduled vote ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    Voted { target: PostRef, attempts: u32 },
    GaveUp { target: PostRef, last_error: String },
}

impl VoteOutcome {
    pub fn is_voted(&self) -> bool {
        matches!(self, Self::Voted { .. })
    }
}

/// Runs one delayed, retrying vote task per published post.
pub struct VoteScheduler {
    publisher: Arc<dyn Publisher>,
    voter: String,
    config: VoteConfig,
    tasks: JoinSet<VoteOutcome>,
}

impl VoteScheduler {
    pub fn new(publisher: Arc<dyn Publisher>, voter: impl Into<String>, config: VoteConfig) -> Self {
        Self {
            publisher,
            voter: voter.into(),
            config,
            tasks: JoinSet::new(),
        }
    }

    /// Tasks not yet joined.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Spawn a vote on `target`. Returns immediately.
    pub fn schedule(&mut self, target: PostRef) {
        let publisher = Arc::clone(&self.publisher);
        let voter = self.voter.clone();
        let config = self.config.clone();

        debug!(target = %target, delay_secs = config.delay_secs, "Vote scheduled");
        self.tasks
            .spawn(async move { vote_with_retry(publisher, voter, config, target).await });
    }

    /// Wait for every scheduled vote to finish.
    pub async fn shutdown(mut self) -> Vec<VoteOutcome> {
        if !self.tasks.is_empty() {
            info!(pending = self.tasks.len(), "Waiting for background votes");
        }

        let mut outcomes = Vec::with_capacity(self.tasks.len());
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(error = %e, "Vote task aborted"),
            }
        }
        outcomes
    }
}

async fn vote_with_retry(
    publisher: Arc<dyn Publisher>,
    voter: String,
    config: VoteConfig,
    target: PostRef,
) -> VoteOutcome {
    tokio::time::sleep(Duration::from_secs(config.delay_secs)).await;

    let max_attempts = config.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        match publisher.vote(&target, config.weight, &voter).await {
            Ok(()) => {
                info!(target = %target, attempt, "Voted");
                return VoteOutcome::Voted {
                    target,
                    attempts: attempt,
                };
            }
            Err(e) => {
                let wait = retry_wait(&e, &config);
                warn!(
                    target = %target,
                    attempt,
                    max_attempts,
                    wait_ms = wait.as_millis() as u64,
                    error = %e,
                    "Vote failed"
                );
                last_error = e.to_string();
                if attempt < max_attempts {
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    warn!(target = %target, max_attempts, "Giving up on vote");
    VoteOutcome::GaveUp { target, last_error }
}

/// Interval rejections get the interval delay plus 100..1000 ms of jitter;
/// anything else gets the fixed retry delay.
fn retry_wait(error: &PublishError, config: &VoteConfig) -> Duration {
    if is_interval_error(&error.to_string()) {
        let jitter_ms = rand::thread_rng().gen_range(100..=1000);
        Duration::from_millis(config.interval_retry_delay_ms + jitter_ms)
    } else {
        Duration::from_secs(config.retry_delay_secs)
    }
}

pub fn is_interval_error(message: &str) -> bool {
    INTERVAL_MARKERS.iter().any(|m| message.contains(m))
}
