//! Device tasks, one per physical sensor.
//!
//! Each task owns exactly one bus channel path, polls it on its own
//! period and turns raw register values into typed events:
//!
//! | Task                | Path           | Period  | Emits                     |
//! |---------------------|----------------|---------|---------------------------|
//! | `BusProbeTask`      | root, 2        | once    | hub connected / error     |
//! | `AngleTask` ×2      | 2 / hub 0, 1   | 100 ms  | `Unsigned` knob position  |
//! | `ConductivityTask`  | 2 / hub 2      | 100 ms  | `Float` mS/cm             |
//! | `FlowTask`          | 5              | 500 ms  | `Float` L/min             |
//! | `EncoderTask`       | 0              | 100 ms  | `Float` rpm               |
//! | `ThermocoupleTask`  | 3              | 1000 ms | `Float` °C                |
//!
//! A bus failure emits `BusFault` (payload: failing address) and skips the
//! rest of the step.  An implausible value emits nothing; the previous
//! value stands.

pub mod angle;
pub mod conductivity;
pub mod encoder;
pub mod filter;
pub mod flow;
pub mod probe;
pub mod pulse;
pub mod thermocouple;

use log::debug;

use crate::bus::BusFault;
use crate::error::{Error, SensorError};
use crate::events::{EventKind, Payload};
use crate::scheduler::Context;

/// Handle a failed sample: faults become events, invalid readings are
/// dropped quietly.
pub(crate) fn report(ctx: &mut Context<'_>, task: &str, error: Error) {
    match error {
        Error::Bus(fault) => report_fault(ctx, task, fault),
        other => debug!("{}: reading discarded: {}", task, other),
    }
}

pub(crate) fn report_fault(ctx: &mut Context<'_>, task: &str, fault: BusFault) {
    debug!("{}: {}", task, fault);
    let address = fault.address().map_or(0, u32::from);
    ctx.dispatch(EventKind::BusFault, Payload::Unsigned(address));
}

/// Reject non-finite values and values outside `min..=max`.
pub fn plausible(value: f32, min: f32, max: f32) -> Result<f32, SensorError> {
    if !value.is_finite() {
        return Err(SensorError::NotFinite);
    }
    if value < min || value > max {
        return Err(SensorError::OutOfRange(value));
    }
    Ok(value)
}
