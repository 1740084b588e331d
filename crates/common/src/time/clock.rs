//! Wall-clock time sources

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

/// Trait for time operations to enable deterministic testing
///
/// Production code uses [`SystemClock`]; tests substitute [`MockClock`] and
/// advance it by hand.
pub trait Clock: Send + Sync + 'static {
    /// Get current system time (wall clock)
    fn system_time(&self) -> SystemTime;
}

/// Real system clock implementation for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Shared clocks, including `Arc<dyn Clock>`
impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn system_time(&self) -> SystemTime {
        (**self).system_time()
    }
}

/// Mock clock for deterministic testing
///
/// Clones share the same elapsed counter, so a clock handed to a client can
/// be advanced from the test body.
#[derive(Debug, Clone)]
pub struct MockClock {
    base_system_time: SystemTime,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a new mock clock starting at the current wall time
    pub fn new() -> Self {
        Self::at(SystemTime::now())
    }

    /// Create a mock clock whose wall time starts at `base_system_time`
    pub fn at(base_system_time: SystemTime) -> Self {
        Self {
            base_system_time,
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, duration: Duration) {
        if let Ok(mut elapsed) = self.elapsed.lock() {
            *elapsed += duration;
        }
    }

    /// Advance the mock clock by whole seconds (convenience method)
    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }

    /// Set the mock clock to a specific elapsed time
    pub fn set_elapsed(&self, duration: Duration) {
        if let Ok(mut elapsed) = self.elapsed.lock() {
            *elapsed = duration;
        }
    }

    /// Get the current elapsed time
    pub fn elapsed(&self) -> Duration {
        self.elapsed.lock().map(|e| *e).unwrap_or(Duration::ZERO)
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn system_time(&self) -> SystemTime {
        self.base_system_time + self.elapsed()
    }
}
