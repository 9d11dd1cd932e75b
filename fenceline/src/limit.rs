//! Token-bucket admission control.
//!
//! One bucket gates one server process: it is constructed by startup code
//! and shared by reference with every worker, so the check itself is
//! internally synchronized. A rejected call is never an error of the
//! fencing layer; it is a "try later" signal for the caller to map onto
//! its transport (resource exhaustion, HTTP 429, ...).
//!
//! # Example
//!
//! ```ignore
//! use fenceline::limit::{RateLimitConfig, TokenBucket};
//!
//! let bucket = TokenBucket::new(RateLimitConfig::default());
//!
//! if bucket.limit() {
//!     return Err(Status::resource_exhausted("ratelimit rejected, please retry later"));
//! }
//! // handle the call
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{FenceError, Result};
use crate::metrics;

/// Admission control configuration.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    /// Maximum burst size; the bucket starts full.
    pub capacity: u32,

    /// Time required to produce one token.
    pub refill_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            refill_interval: Duration::from_secs(1),
        }
    }
}

impl RateLimitConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(FenceError::Config("capacity must be positive".into()));
        }

        if self.refill_interval.is_zero() {
            return Err(FenceError::Config(
                "refill_interval must be positive".into(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

/// A lazily refilled token bucket.
///
/// Tokens are replenished on lookup from the time elapsed since the last
/// refill, one per `refill_interval`, clamped to `capacity`. The refill
/// baseline advances by whole intervals only; the sub-interval remainder
/// keeps accruing across lookups. Rejections are immediate and consume
/// nothing.
#[derive(Debug)]
pub struct TokenBucket {
    config: RateLimitConfig,
    state: Mutex<Bucket>,
    rejected: AtomicU64,
}

impl TokenBucket {
    pub fn new(config: RateLimitConfig) -> Self {
        let state = Mutex::new(Bucket {
            tokens: config.capacity,
            last_refill: Instant::now(),
        });

        Self {
            config,
            state,
            rejected: AtomicU64::new(0),
        }
    }

    /// Checks one unit of work against the bucket.
    ///
    /// Returns `true` when the call must be rejected; the caller proceeds
    /// only on `false`, which consumes one token.
    pub fn limit(&self) -> bool {
        let mut bucket = self.state.lock();
        let now = Instant::now();
        let interval = self.config.refill_interval;
        let elapsed = now.saturating_duration_since(bucket.last_refill);

        if !interval.is_zero() && elapsed >= interval {
            let intervals = elapsed.as_nanos() / interval.as_nanos();
            let missing = u128::from(self.config.capacity - bucket.tokens);

            if intervals >= missing {
                bucket.tokens = self.config.capacity;
                bucket.last_refill = now;
            } else {
                bucket.tokens += intervals as u32;
                bucket.last_refill += interval * intervals as u32;
            }
        }

        if bucket.tokens == 0 {
            drop(bucket);

            self.rejected.fetch_add(1, Ordering::Relaxed);
            metrics::record_rate_limited();

            return true;
        }

        bucket.tokens -= 1;

        false
    }

    /// Tokens currently available without triggering a refill.
    pub fn available(&self) -> u32 {
        self.state.lock().tokens
    }

    /// Total rejections since construction.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}
