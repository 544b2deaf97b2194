//! Token-bucket rate limiter
//!
//! Bounds request rates against external calendar providers. Allows
//! bursts up to capacity, then refills at a fixed rate. Concurrent
//! access is safe; the bucket is the single owner of its state and is
//! passed by reference, never reached through a global.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket rate limiter.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a bucket holding up to `capacity` tokens, refilled at
    /// `refill_amount` tokens per `refill_interval`.
    ///
    /// Zero capacity or a zero interval is rejected.
    pub fn new(capacity: u64, refill_amount: u64, refill_interval: Duration) -> Result<Self, String> {
        if capacity == 0 {
            return Err("capacity must be greater than 0".to_string());
        }
        if refill_amount == 0 {
            return Err("refill_amount must be greater than 0".to_string());
        }
        if refill_interval.is_zero() {
            return Err("refill_interval must be greater than zero".to_string());
        }

        Ok(Self {
            capacity: capacity as f64,
            refill_per_sec: refill_amount as f64 / refill_interval.as_secs_f64(),
            state: Mutex::new(BucketState { tokens: capacity as f64, last_refill: Instant::now() }),
        })
    }

    /// Convenience constructor: `per_minute` requests per minute with a
    /// matching burst capacity.
    pub fn per_minute(per_minute: u32) -> Result<Self, String> {
        Self::new(u64::from(per_minute.max(1)), u64::from(per_minute.max(1)), Duration::from_secs(60))
    }

    /// Try to acquire `count` tokens; returns false when exhausted.
    pub fn try_acquire(&self, count: u64) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state);

        let requested = count as f64;
        if state.tokens >= requested {
            state.tokens -= requested;
            true
        } else {
            false
        }
    }

    /// Time until `count` tokens will be available, zero when they
    /// already are. Callers sleep for this long before retrying.
    pub fn delay_until_available(&self, count: u64) -> Duration {
        let mut state = self.state.lock();
        self.refill(&mut state);

        let missing = count as f64 - state.tokens;
        if missing <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(missing / self.refill_per_sec)
    }

    /// Tokens currently available.
    pub fn available(&self) -> u64 {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.tokens as u64
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
            state.last_refill = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_configuration() {
        assert!(TokenBucket::new(0, 1, Duration::from_secs(1)).is_err());
        assert!(TokenBucket::new(10, 0, Duration::from_secs(1)).is_err());
        assert!(TokenBucket::new(10, 1, Duration::ZERO).is_err());
    }

    #[test]
    fn allows_burst_up_to_capacity() {
        let bucket = TokenBucket::new(5, 1, Duration::from_secs(60)).unwrap();
        for _ in 0..5 {
            assert!(bucket.try_acquire(1));
        }
        assert!(!bucket.try_acquire(1));
    }

    #[test]
    fn refills_over_time() {
        let bucket = TokenBucket::new(2, 100, Duration::from_millis(100)).unwrap();
        assert!(bucket.try_acquire(2));
        assert!(!bucket.try_acquire(1));

        std::thread::sleep(Duration::from_millis(20));
        assert!(bucket.try_acquire(1));
    }

    #[test]
    fn reports_delay_when_exhausted() {
        let bucket = TokenBucket::new(1, 1, Duration::from_secs(10)).unwrap();
        assert!(bucket.try_acquire(1));
        let delay = bucket.delay_until_available(1);
        assert!(delay > Duration::ZERO);
        assert!(delay <= Duration::from_secs(10));
    }

    #[test]
    fn zero_delay_when_tokens_available() {
        let bucket = TokenBucket::new(3, 1, Duration::from_secs(1)).unwrap();
        assert_eq!(bucket.delay_until_available(2), Duration::ZERO);
    }
}
