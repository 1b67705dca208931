//! Stirred-tank controller firmware library.
//!
//! Exposes the pure-logic modules for integration testing.  All
//! ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each module.
//!
//! The `espidf` feature is on by default for the firmware binary.  Host
//! tests build without it:
//!
//! ```text
//! cargo test --no-default-features
//! ```

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod bus;
pub mod config;
pub mod control;
pub mod drivers;
pub mod error;
pub mod events;
pub mod net;
pub mod pins;
pub mod scheduler;
pub mod sensors;
pub mod telemetry;
