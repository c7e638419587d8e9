//! Shared infrastructure for the sidus workspace.

pub mod buffer2;
pub mod log_setup;
pub mod parallel;
pub mod shared_fn;

pub use buffer2::{Buffer2, Rect};
pub use log_setup::{LogSetupError, init_test_logging, setup_logging, setup_logging_in};
pub use shared_fn::SharedFn;
