//! Sliding-window rate limiter.
//!
//! Callers are never rejected: `acquire` reserves the earliest admission
//! instant that keeps the window under budget and sleeps until then. The
//! reservation is made under a synchronous mutex; the sleep happens after
//! the guard is dropped.

use log::debug;
use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    // Admission instants, oldest first. Holds at most `limit` entries; the
    // newest may lie in the future while its owner is still sleeping.
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(limit: NonZeroU32, window: Duration) -> Self {
        let limit = limit.get() as usize;
        Self {
            limit,
            window,
            admitted: Mutex::new(VecDeque::with_capacity(limit)),
        }
    }

    pub fn per_minute(limit: NonZeroU32) -> Self {
        Self::new(limit, DEFAULT_WINDOW)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait for a permit. Returns how long the caller was held back.
    pub async fn acquire(&self) -> Duration {
        let now = Instant::now();
        let admit_at = self.reserve(now);
        let wait = admit_at.saturating_duration_since(now);
        if !wait.is_zero() {
            debug!(
                "rate limit of {} per {:?} reached; waiting {:?}",
                self.limit, self.window, wait
            );
            tokio::time::sleep_until(admit_at).await;
        }
        wait
    }

    /// Take a permit only if one is free right now. Never waits and
    /// reserves nothing on refusal.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut admitted = self.admitted.lock().unwrap_or_else(PoisonError::into_inner);
        Self::purge(&mut admitted, now, self.window);
        if admitted.len() >= self.limit {
            return false;
        }
        admitted.push_back(now);
        true
    }

    /// Admissions (including pending reservations) inside the current window.
    pub fn admitted_in_window(&self) -> usize {
        let now = Instant::now();
        let admitted = self.admitted.lock().unwrap_or_else(PoisonError::into_inner);
        admitted
            .iter()
            .filter(|&&at| at + self.window > now)
            .count()
    }

    fn reserve(&self, now: Instant) -> Instant {
        let mut admitted = self.admitted.lock().unwrap_or_else(PoisonError::into_inner);
        Self::purge(&mut admitted, now, self.window);
        let admit_at = match admitted.front() {
            Some(&oldest) if admitted.len() >= self.limit => (oldest + self.window).max(now),
            _ => now,
        };
        admitted.push_back(admit_at);
        while admitted.len() > self.limit {
            admitted.pop_front();
        }
        admit_at
    }

    fn purge(admitted: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(&oldest) = admitted.front() {
            if oldest + window <= now {
                admitted.pop_front();
            } else {
                break;
            }
        }
    }
}
