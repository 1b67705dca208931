//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against simulated adapters.  All tests run on the host (x86_64) with
//! no real hardware required:
//!
//! ```text
//! cargo test --no-default-features
//! ```

mod device_tests;
mod firmware_tests;
mod mock_hw;
mod network_tests;
mod scheduler_tests;
