//! Local token bucket for the upstream per-minute call budget.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket holding up to `calls_per_minute` tokens, refilled continuously.
#[derive(Debug)]
pub struct CallBudget {
    capacity: f64,
    refill_per_sec: f64,
    bucket: Mutex<Bucket>,
}

impl CallBudget {
    pub fn per_minute(calls_per_minute: u32) -> Self {
        let capacity = f64::from(calls_per_minute.max(1));
        Self {
            capacity,
            refill_per_sec: capacity / 60.0,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Takes one token, or returns how long until the next one is available.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut bucket = self.bucket.lock();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.last_refill = now;
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - bucket.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_per_sec))
        }
    }

    pub fn available(&self) -> u32 {
        self.bucket.lock().tokens.floor() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_exhausts_and_reports_wait() {
        let budget = CallBudget::per_minute(2);
        assert!(budget.try_acquire().is_ok());
        assert!(budget.try_acquire().is_ok());

        let wait = budget.try_acquire().unwrap_err();
        assert!(wait > Duration::from_secs(25) && wait <= Duration::from_secs(30));
        assert_eq!(budget.available(), 0);
    }
}
