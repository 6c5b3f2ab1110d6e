//! Shared utilities for the astrosight workspace.

pub mod cancel;
pub mod log_setup;
pub mod parallel;
pub mod shared_fn;
pub mod yaml;

pub use cancel::CancelToken;
pub use shared_fn::SharedFn;
