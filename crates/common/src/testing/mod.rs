//! Testing utilities and helpers
//!
//! - **[`async_utils`]**: async waiting helpers that cooperate with paused
//!   tokio time
//! - **[`tracing`]**: one-shot tracing subscriber setup for test binaries
//!
//! ## Usage
//!
//! ```rust
//! # #[cfg(feature = "test-utils")]
//! # {
//! use freshet_common::testing::init_test_tracing;
//!
//! fn test_with_logs() {
//!     init_test_tracing();
//!     // ... RUST_LOG=freshet_core=debug shows cache activity
//! }
//! # }
//! ```

pub mod async_utils;
pub mod tracing;

// Note: `assert_eventually_async!` is exported at the crate root
pub use async_utils::{poll_until, settle, timeout_ok};
pub use tracing::init_test_tracing;
