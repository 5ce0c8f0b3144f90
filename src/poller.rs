//! Eventual-consistency poller.
//!
//! Lifecycle actions are applied by a background scanner whose firing time is
//! unknown, so every assertion about them is made by re-reading the object
//! until the expected state shows up or the poll bound runs out. The first
//! read is issued immediately because some scanners evaluate rules lazily on
//! access.
//!
//! Two modes are offered:
//! - [`Poller::wait_for`] succeeds as soon as the judge is satisfied and fails
//!   when the bound is exhausted.
//! - [`Poller::hold`] succeeds only after the condition held on every read for
//!   the full bound, which is how "must not be deleted" checks avoid racing
//!   the scanner.
//!
//! A "not found" error from the read is turned into [`Observation::Absent`];
//! every other error aborts the poll at once.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::types::error::is_not_found_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollBound {
    /// Stop after this many reads, the triggering read included.
    Attempts(u32),
    /// Stop once this much time has elapsed since the triggering read.
    Elapsed(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub bound: PollBound,
}

impl PollPolicy {
    pub fn attempts(attempts: u32, interval: Duration) -> Self {
        PollPolicy {
            interval,
            bound: PollBound::Attempts(attempts.max(1)),
        }
    }

    pub fn elapsed(max_wait: Duration, interval: Duration) -> Self {
        PollPolicy {
            interval,
            bound: PollBound::Elapsed(max_wait),
        }
    }
}

/// What a single read saw.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation<T> {
    Present(T),
    Absent,
}

impl<T> Observation<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Observation::Absent)
    }

    pub fn present(&self) -> Option<&T> {
        match self {
            Observation::Present(value) => Some(value),
            Observation::Absent => None,
        }
    }
}

/// Verdict of a judge on a single observation.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    Pending,
    Satisfied,
    /// The state moved somewhere it can never come back from.
    Violated(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Satisfied,
    Violated(String),
    Exhausted,
}

#[derive(Debug)]
pub struct PollReport<T> {
    pub outcome: PollOutcome,
    pub last: Observation<T>,
    pub attempts: u32,
    pub elapsed: Duration,
}

impl<T> PollReport<T> {
    pub fn is_satisfied(&self) -> bool {
        self.outcome == PollOutcome::Satisfied
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Poller {
    policy: PollPolicy,
}

impl Poller {
    pub fn new(policy: PollPolicy) -> Self {
        Poller { policy }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Re-read until `judge` is satisfied, violated, or the bound runs out.
    pub async fn wait_for<T, F, Fut, J>(
        &self,
        target: &str,
        mut read: F,
        mut judge: J,
    ) -> Result<PollReport<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        J: FnMut(&Observation<T>) -> Progress,
    {
        self.run(target, &mut read, |observation| judge(observation))
            .await
            .map(|(outcome, last, attempts, elapsed)| PollReport {
                outcome: outcome.unwrap_or(PollOutcome::Exhausted),
                last,
                attempts,
                elapsed,
            })
    }

    /// Re-read for the full bound, failing on the first read where `check`
    /// reports an error.
    pub async fn hold<T, F, Fut, C>(
        &self,
        target: &str,
        mut read: F,
        mut check: C,
    ) -> Result<PollReport<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        C: FnMut(&Observation<T>) -> std::result::Result<(), String>,
    {
        self.run(target, &mut read, |observation| match check(observation) {
            Ok(()) => Progress::Pending,
            Err(message) => Progress::Violated(message),
        })
        .await
        .map(|(outcome, last, attempts, elapsed)| PollReport {
            outcome: outcome.unwrap_or(PollOutcome::Satisfied),
            last,
            attempts,
            elapsed,
        })
    }

    /// Returns `None` as the outcome when the bound was exhausted.
    async fn run<T, F, Fut, J>(
        &self,
        target: &str,
        read: &mut F,
        mut judge: J,
    ) -> Result<(Option<PollOutcome>, Observation<T>, u32, Duration)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        J: FnMut(&Observation<T>) -> Progress,
    {
        let start = Instant::now();
        let mut attempts = 0;

        loop {
            let observation = match read().await {
                Ok(value) => Observation::Present(value),
                Err(e) if is_not_found_error(&e) => Observation::Absent,
                Err(e) => {
                    return Err(e.context(format!(
                        "unexpected error while polling {target} (attempt {}).",
                        attempts + 1
                    )));
                }
            };
            attempts += 1;

            match judge(&observation) {
                Progress::Satisfied => {
                    debug!(
                        target_object = target,
                        attempts = attempts,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "poll satisfied."
                    );
                    return Ok((
                        Some(PollOutcome::Satisfied),
                        observation,
                        attempts,
                        start.elapsed(),
                    ));
                }
                Progress::Violated(message) => {
                    debug!(
                        target_object = target,
                        attempts = attempts,
                        message = message,
                        "poll violated."
                    );
                    return Ok((
                        Some(PollOutcome::Violated(message)),
                        observation,
                        attempts,
                        start.elapsed(),
                    ));
                }
                Progress::Pending => {}
            }

            let wait = match self.policy.bound {
                PollBound::Attempts(max_attempts) => {
                    if attempts >= max_attempts {
                        None
                    } else {
                        Some(self.policy.interval)
                    }
                }
                PollBound::Elapsed(max_wait) => {
                    let elapsed = start.elapsed();
                    if elapsed >= max_wait {
                        None
                    } else {
                        Some(self.policy.interval.min(max_wait - elapsed))
                    }
                }
            };

            let Some(wait) = wait else {
                debug!(
                    target_object = target,
                    attempts = attempts,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "poll bound exhausted."
                );
                return Ok((None, observation, attempts, start.elapsed()));
            };

            trace!(
                target_object = target,
                attempts = attempts,
                "condition pending, re-reading in {} ms.",
                wait.as_millis()
            );
            tokio::time::sleep(wait).await;
        }
    }
}
