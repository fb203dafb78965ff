//! Testing utilities and mock implementations
//!
//! In-memory workflow executor and agent dispatcher doubles, so the task
//! runner and the handoff manager can be driven without real orchestrators.

pub mod mocks;

pub use mocks::*;
