use chrono::Utc;
use parking_lot::RwLock;

/// Source of "now" for lock expiry, in fractional seconds since the epoch
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        Utc::now().timestamp_micros() as f64 / 1_000_000.0
    }
}

/// Hand-driven clock for deterministic tests and time travel
#[derive(Debug, Default)]
pub struct ManualClock {
    now: RwLock<f64>,
}

impl ManualClock {
    pub fn new(now: f64) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// Jump to an absolute time
    pub fn travel_to(&self, now: f64) {
        *self.now.write() = now;
    }

    /// Move forward by `seconds`
    pub fn advance(&self, seconds: f64) {
        *self.now.write() += seconds;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.read()
    }
}
