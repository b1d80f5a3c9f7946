// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Polling
//!
//! Wait schedules for long running vendor jobs and bounded retries.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Implements polling

use crate::domain::config::PollingConfig;
use crate::domain::error::{CloudPubError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Ordered waits between attempts; the last wait repeats forever
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WaitChain {
    waits: Vec<Duration>,
}

impl WaitChain {
    pub fn new(waits: Vec<Duration>) -> Self {
        Self { waits }
    }

    pub fn fixed(wait: Duration) -> Self {
        Self { waits: vec![wait] }
    }

    /// Wait after the given (0-based) attempt
    pub fn wait_for(&self, attempt: usize) -> Duration {
        self.waits
            .get(attempt)
            .or_else(|| self.waits.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub waits: WaitChain,
    /// Give up once the next wait would end past this delay
    pub deadline: Option<Duration>,
    pub max_attempts: Option<u32>,
}

impl PollPolicy {
    /// Same interval between a bounded number of attempts
    pub fn fixed(interval: Duration, attempts: u32) -> Self {
        Self {
            waits: WaitChain::fixed(interval),
            deadline: None,
            max_attempts: Some(attempts),
        }
    }
}

impl TryFrom<&PollingConfig> for PollPolicy {
    type Error = CloudPubError;

    /// A policy must stop at some point: either a deadline or an attempt limit is required.
    fn try_from(config: &PollingConfig) -> Result<Self> {
        if config.deadline.is_none() && config.max_attempts.is_none() {
            return Err(CloudPubError::InvalidInput(
                "A polling policy needs a deadline or a maximum number of attempts".to_string(),
            ));
        }
        Ok(Self {
            waits: WaitChain::new(config.wait_durations()),
            deadline: config.deadline,
            max_attempts: config.max_attempts,
        })
    }
}

/// Call `op` until its value satisfies `is_done`.
///
/// Errors from `op` are returned immediately. When the attempt budget or the
/// deadline is exhausted a `Timeout` is returned.
pub async fn poll_until<T, F, Fut, P>(policy: &PollPolicy, what: &str, mut op: F, is_done: P) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&T) -> bool,
{
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        let value = op().await?;
        if is_done(&value) {
            return Ok(value);
        }
        attempt += 1;

        let exhausted_attempts = policy.max_attempts.is_some_and(|max| attempt >= max);
        let wait = policy.waits.wait_for(attempt as usize - 1);
        let exhausted_deadline = policy
            .deadline
            .is_some_and(|deadline| started.elapsed() + wait > deadline);

        if exhausted_attempts || exhausted_deadline {
            warn!("Gave up waiting for {} after {} attempts", what, attempt);
            return Err(CloudPubError::Timeout(format!("Timed out waiting for {} to finish", what)));
        }

        debug!("{} not finished yet (attempt {}), waiting {:?}", what, attempt, wait);
        tokio::time::sleep(wait).await;
    }
}

/// Run `op` up to `attempts` times, retrying only non-fatal errors.
pub async fn retry_async<T, F, Fut>(attempts: u32, wait: Duration, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_fatal() || attempt >= attempts => return Err(e),
            Err(e) => {
                warn!("{} failed (attempt {}/{}): {}", what, attempt, attempts, e);
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}
