//! Time abstractions
//!
//! Record timestamps, staleness checks and eviction deadlines all read time
//! through [`Clock`] so tests can drive them with [`MockClock`] instead of
//! sleeping.
//!
//! ```rust
//! use std::time::Duration;
//!
//! use freshet_common::time::{Clock, MockClock};
//!
//! let clock = MockClock::new();
//! let before = clock.system_time();
//! clock.advance(Duration::from_secs(61));
//! assert_eq!(clock.system_time().duration_since(before).unwrap(), Duration::from_secs(61));
//! ```

pub mod clock;

pub use clock::{Clock, MockClock, SystemClock};
