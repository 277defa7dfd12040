//! Request pacing between consecutive OCR calls.
//!
//! Vision APIs enforce per-minute request budgets. Pages are sent one at a
//! time, so the only lever is how long to wait before each call. The
//! [`Pacer`] trait hides that decision from the OCR loop:
//!
//! * [`FixedDelay`] — sleep a constant interval before every call (default,
//!   250 ms).
//! * [`TokenBucket`] — allow bursts up to `capacity` calls, refilled at a
//!   steady rate.
//! * [`Unpaced`] — never wait; used by tests and local models.

use crate::config::PacingPolicy;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::debug;

/// Decides how long to wait before the next model call.
#[async_trait]
pub trait Pacer: Send + Sync {
    /// Wait until one more request may be sent.
    async fn acquire(&self);
}

/// Never waits.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unpaced;

#[async_trait]
impl Pacer for Unpaced {
    async fn acquire(&self) {}
}

/// Sleeps a constant interval before every request.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

#[async_trait]
impl Pacer for FixedDelay {
    async fn acquire(&self) {
        if !self.0.is_zero() {
            sleep(self.0).await;
        }
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket: up to `capacity` requests back to back, then one request
/// per `1 / refill_per_sec` seconds.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// `capacity` and `requests_per_minute` are clamped to at least 1.
    pub fn new(capacity: u32, requests_per_minute: u32) -> Self {
        let capacity = capacity.max(1) as f64;
        Self {
            capacity,
            refill_per_sec: requests_per_minute.max(1) as f64 / 60.0,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take a token if one is available, otherwise return how long until
    /// the next one is.
    fn try_take(&self) -> Result<(), Duration> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - state.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_per_sec))
        }
    }
}

#[async_trait]
impl Pacer for TokenBucket {
    async fn acquire(&self) {
        loop {
            match self.try_take() {
                Ok(()) => return,
                Err(wait) => {
                    debug!("Token bucket empty, waiting {:?}", wait);
                    sleep(wait).await;
                }
            }
        }
    }
}

/// Build the pacer described by a [`PacingPolicy`].
pub fn pacer_for(policy: &PacingPolicy) -> Arc<dyn Pacer> {
    match *policy {
        PacingPolicy::None => Arc::new(Unpaced),
        PacingPolicy::FixedDelay { millis } => Arc::new(FixedDelay(Duration::from_millis(millis))),
        PacingPolicy::TokenBucket {
            burst,
            requests_per_minute,
        } => Arc::new(TokenBucket::new(burst, requests_per_minute)),
    }
}
