//! Control loops.

pub mod pid;

pub use pid::{ControlStep, SpeedController};
