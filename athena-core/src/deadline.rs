//! Cooperative deadlines. Every public operation accepts one; on expiry the
//! operation returns partial results where meaningful, marked as such.

use std::time::{Duration, Instant};

/// A monotonic deadline. `Deadline::none()` never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    expires_at: Option<Instant>,
}

impl Deadline {
    /// A deadline that never expires.
    pub fn none() -> Self {
        Self { expires_at: None }
    }

    /// Expire `d` from now.
    pub fn after(d: Duration) -> Self {
        Self { expires_at: Some(Instant::now() + d) }
    }

    pub fn expired(&self) -> bool {
        match self.expires_at {
            Some(t) => Instant::now() >= t,
            None => false,
        }
    }

    /// Remaining time, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|t| t.saturating_duration_since(Instant::now()))
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}
