//! Application layer: port traits, operator commands and the firmware
//! assembly that wires every task together.
//!
//! All interaction with the radio, the broker and the console happens
//! through **port traits** defined in [`ports`], keeping the task set
//! testable without real peripherals.

pub mod commands;
pub mod ports;
pub mod service;
