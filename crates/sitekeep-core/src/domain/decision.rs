//! Decision model: retry or give up after a failed remote step.
//!
//! The coordinator runs every per-site remote step through a [`Decider`].
//! Deciders are pure: given how many attempts were made and what went wrong,
//! they return the next action and leave the sleeping to the caller.

use std::time::Duration;

use super::errors::BackupError;
use super::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Try the step again after a delay.
    Retry { delay: Duration, reason: String },

    /// Stop and record the error for this site.
    GiveUp { reason: String },
}

pub trait Decider: Send + Sync {
    /// # Arguments
    /// * `attempts` - attempts made so far, including the one that just failed (1-indexed)
    /// * `error` - the error from the most recent attempt
    fn decide(&self, attempts: u32, error: &BackupError) -> Decision;
}

/// Retries retryable errors (see [`BackupError::is_retryable`]) until
/// `max_attempts` is reached, with exponential backoff from [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct DefaultDecider {
    retry_policy: RetryPolicy,
    max_attempts: u32,
}

impl DefaultDecider {
    pub fn new(retry_policy: RetryPolicy, max_attempts: u32) -> Self {
        Self {
            retry_policy,
            max_attempts: max_attempts.max(1),
        }
    }

    /// One attempt only.
    pub fn no_retry() -> Self {
        Self::new(RetryPolicy::default(), 1)
    }
}

impl Decider for DefaultDecider {
    fn decide(&self, attempts: u32, error: &BackupError) -> Decision {
        if !error.is_retryable() {
            return Decision::GiveUp {
                reason: format!("not retryable ({:?})", error.kind()),
            };
        }
        if attempts >= self.max_attempts {
            return Decision::GiveUp {
                reason: format!("Max attempts reached: {}/{}", attempts, self.max_attempts),
            };
        }
        let delay = self.retry_policy.next_delay(attempts);
        Decision::Retry {
            delay,
            reason: format!(
                "Retry attempt {}/{} after {:?}",
                attempts + 1,
                self.max_attempts,
                delay
            ),
        }
    }
}
