//! Common utility functions
//!
//! - **[`serde`]**: Serialization helpers for common data types

pub mod serde;

// Re-export commonly used items for convenience
pub use self::serde::duration_secs;
