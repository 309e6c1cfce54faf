//! Bounded retries with an explicit outcome.
//!
//! A retried action reports each attempt as success, a retryable failure, or
//! a terminal error. Between attempts the action may run a recovery step
//! (for example asking the generation service to fix failing tests).

use async_trait::async_trait;
use std::fmt;
use tracing::warn;

/// Position of an attempt within its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// 1-based
    pub number: u32,
    pub max: u32,
}

impl Attempt {
    pub fn is_last(&self) -> bool {
        self.number >= self.max
    }
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.number, self.max)
    }
}

pub enum AttemptResult<T, F> {
    Success(T),
    Retryable(F),
    Terminal(anyhow::Error),
}

#[async_trait]
pub trait Attemptable: Send {
    type Output: Send;
    type Failure: fmt::Display + Send + Sync;

    async fn attempt(&mut self, attempt: Attempt) -> AttemptResult<Self::Output, Self::Failure>;

    /// Runs after a retryable failure when another attempt follows.
    async fn recover(
        &mut self,
        _attempt: Attempt,
        _failure: &Self::Failure,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
pub enum RetryOutcome<T, F> {
    Succeeded { value: T, attempts: u32 },
    /// Every attempt failed retryably
    Exhausted { attempts: u32, last_failure: F },
    /// An attempt or recovery failed terminally
    Failed(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// At least one attempt is always made.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub async fn run<A: Attemptable>(
        &self,
        label: &str,
        action: &mut A,
    ) -> RetryOutcome<A::Output, A::Failure> {
        let mut number = 1;
        loop {
            let attempt = Attempt {
                number,
                max: self.max_attempts,
            };
            match action.attempt(attempt).await {
                AttemptResult::Success(value) => {
                    return RetryOutcome::Succeeded {
                        value,
                        attempts: number,
                    };
                }
                AttemptResult::Terminal(err) => return RetryOutcome::Failed(err),
                AttemptResult::Retryable(failure) => {
                    if attempt.is_last() {
                        warn!(action = label, attempt = %attempt, failure = %failure, "attempts exhausted");
                        return RetryOutcome::Exhausted {
                            attempts: number,
                            last_failure: failure,
                        };
                    }
                    warn!(action = label, attempt = %attempt, failure = %failure, "attempt failed; retrying");
                    if let Err(err) = action.recover(attempt, &failure).await {
                        return RetryOutcome::Failed(err);
                    }
                    number += 1;
                }
            }
        }
    }
}
