//! Actuator drivers: the H-bridge units and the motor tasks that drive
//! them.

pub mod hbridge;
pub mod motor;
