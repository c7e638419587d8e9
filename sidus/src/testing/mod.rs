//! Testing utilities for sidus.

pub mod synthetic;

pub use synthetic::{StarField, StarFieldConfig, SyntheticStar};

/// Initialize tracing for tests.
/// Safe to call multiple times. Respects RUST_LOG, defaults to "info".
pub fn init_tracing() {
    common::init_test_logging();
}
