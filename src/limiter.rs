//! Rate Limiter Module
//!
//! Sliding-window limiter for outbound calls: at most `max_requests`
//! admissions inside any trailing `window`. Callers over the limit wait
//! instead of being rejected.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::RateLimitConfig;
use crate::error::ConfigError;

// == Rate Limiter ==
/// Process-local sliding-window limiter.
///
/// Admission is serialized behind one async mutex; the mutex is released
/// while a caller sleeps so other callers can observe the window.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    // == Constructor ==
    /// Creates a limiter admitting `max_requests` calls per `window`.
    ///
    /// # Errors
    /// `ConfigError` when either limit is zero.
    pub fn new(max_requests: usize, window: Duration) -> Result<Self, ConfigError> {
        if max_requests == 0 {
            return Err(ConfigError::InvalidMaxRequests(
                "max_requests must be > 0".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(ConfigError::InvalidWindow("window must be > 0".to_string()));
        }

        Ok(Self {
            max_requests,
            window,
            admitted: Mutex::new(VecDeque::with_capacity(max_requests)),
        })
    }

    pub fn from_config(config: &RateLimitConfig) -> Result<Self, ConfigError> {
        Self::new(config.max_requests, config.window())
    }

    fn prune(&self, admitted: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = admitted.front() {
            if now.duration_since(oldest) >= self.window {
                admitted.pop_front();
            } else {
                break;
            }
        }
    }

    // == Acquire ==
    /// Waits until a slot is free and records the admission.
    ///
    /// Returns the total time spent waiting (zero when admitted at once).
    pub async fn acquire(&self) -> Duration {
        let started = Instant::now();

        loop {
            let wait = {
                let mut admitted = self.admitted.lock().await;
                let now = Instant::now();
                self.prune(&mut admitted, now);

                if admitted.len() < self.max_requests {
                    admitted.push_back(now);
                    let waited = now.duration_since(started);
                    if !waited.is_zero() {
                        debug!(waited_ms = waited.as_millis() as u64, "rate limit slot acquired");
                    }
                    return waited;
                }

                match admitted.front() {
                    Some(&oldest) => (oldest + self.window).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };

            debug!(wait_ms = wait.as_millis() as u64, "rate limit reached, waiting");
            // Another caller may take the freed slot; the loop re-checks
            tokio::time::sleep(wait).await;
        }
    }

    // == Introspection ==
    /// Free slots in the trailing window right now.
    pub async fn available(&self) -> usize {
        self.max_requests - self.in_window().await
    }

    /// Admissions counted in the trailing window.
    pub async fn in_window(&self) -> usize {
        let mut admitted = self.admitted.lock().await;
        self.prune(&mut admitted, Instant::now());
        admitted.len()
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
