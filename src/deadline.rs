//! Caller-supplied time limit for a processing run.

use std::time::Duration;

use tokio::time::Instant;

/// A point in time after which no further external calls are issued.
///
/// Work already in flight is allowed to finish; whatever was produced is
/// returned and labeled as cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }
}

/// True when `deadline` is set and has passed.
pub fn expired(deadline: Option<Deadline>) -> bool {
    deadline.map(|d| d.is_expired()).unwrap_or(false)
}
