//! Testing utilities and mock implementations
//!
//! This module provides a scriptable in-memory transport so the connection
//! manager can be exercised without a running event bus.

pub mod mocks;

pub use mocks::*;
