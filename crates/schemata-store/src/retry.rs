// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded retry for the startup reads.
//!
//! Only the two bootstrap reads of global compatibility/mode are retried;
//! no operation retries across the write-then-wait boundary.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounded exponential-backoff retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Backoff before the second attempt, milliseconds.
    pub initial_backoff_ms: u64,
    /// Backoff ceiling, milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds or the attempt budget is spent; the last
    /// error is returned unchanged.
    pub fn run<T, E, F>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: fmt::Display,
    {
        let mut backoff = Duration::from_millis(self.initial_backoff_ms);
        let max_backoff = Duration::from_millis(self.max_backoff_ms);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_attempts => {
                    log::error!(
                        "[retry] {} failed after {} attempt(s): {}",
                        what,
                        attempt,
                        e
                    );
                    return Err(e);
                }
                Err(e) => {
                    log::warn!(
                        "[retry] {} attempt {}/{} failed, retrying in {:?}: {}",
                        what,
                        attempt,
                        self.max_attempts,
                        backoff,
                        e
                    );
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(max_backoff);
                }
            }
        }
    }
}
