//! Analog conductivity probe on a hub port.
//!
//! The probe board outputs a voltage proportional to conductance.  The
//! conversion to mS/cm is temperature compensated to 25 °C using the
//! latest water temperature, which arrives as thermocouple events.

use embedded_hal::i2c::I2c;

use crate::bus::downstream::PortHub;
use crate::bus::{ChannelPath, SharedBus};
use crate::error::Error;
use crate::events::{Event, EventHandler, EventKind, Payload};
use crate::scheduler::{Context, Task};

use super::filter::RollingAverage;
use super::{plausible, report};

/// ADC full scale (12-bit).
pub const ADC_FULL_SCALE: f32 = 4096.0;
/// ADC reference, millivolts.
pub const ADC_REFERENCE_MV: f32 = 3300.0;
/// Probe board gain resistor.
pub const RES2: f32 = 7500.0 / 0.66;
/// Reference conductance scale of the probe board.
pub const EC_REF: f32 = 20.0;
/// Linear temperature compensation coefficient, per °C.
pub const TEMP_COEFFICIENT: f32 = 0.0185;
/// Assumed water temperature until a thermocouple reading arrives.
pub const DEFAULT_TEMPERATURE_C: f32 = 25.0;
pub const WINDOW: usize = 5;

/// Upper bound of what the probe can physically report, mS/cm.
const MAX_EC: f32 = 1000.0;

/// Convert a raw ADC sample to millivolts.
pub fn adc_to_millivolts(raw: u16) -> f32 {
    f32::from(raw) / ADC_FULL_SCALE * ADC_REFERENCE_MV
}

/// Conductivity in mS/cm for a probe voltage (mV) at `temperature_c`,
/// with cell constant `k`.
pub fn ec_from_voltage(voltage_mv: f32, temperature_c: f32, k: f32) -> f32 {
    let raw_ec = 1000.0 * voltage_mv / RES2 / EC_REF;
    raw_ec * k / (1.0 + TEMP_COEFFICIENT * (temperature_c - 25.0))
}

pub struct ConductivityTask<I2C> {
    bus: SharedBus<I2C>,
    hub: PortHub,
    path: ChannelPath,
    k: f32,
    temperature_c: f32,
    average: RollingAverage,
    last_value: Option<f32>,
}

impl<I2C: I2c> ConductivityTask<I2C> {
    pub fn new(bus: SharedBus<I2C>, hub: PortHub, path: ChannelPath, k: f32) -> Self {
        Self {
            bus,
            hub,
            path,
            k,
            temperature_c: DEFAULT_TEMPERATURE_C,
            average: RollingAverage::new(WINDOW),
            last_value: None,
        }
    }

    pub fn set_temperature(&mut self, celsius: f32) {
        if celsius.is_finite() {
            self.temperature_c = celsius;
        }
    }

    pub fn temperature(&self) -> f32 {
        self.temperature_c
    }

    /// Last smoothed value emitted.
    pub fn last_value(&self) -> Option<f32> {
        self.last_value
    }

    /// Read the probe and return the smoothed conductivity.
    pub fn sample(&mut self) -> Result<f32, Error> {
        let raw = self.hub.analog_read(&self.bus, self.path)?;
        let ec = ec_from_voltage(adc_to_millivolts(raw), self.temperature_c, self.k);
        let ec = plausible(ec, 0.0, MAX_EC)?;
        let smoothed = self.average.push(ec);
        self.last_value = Some(smoothed);
        Ok(smoothed)
    }
}

impl<I2C: I2c> EventHandler for ConductivityTask<I2C> {
    fn handle_event(&mut self, event: &Event, _ctx: &mut Context<'_>) {
        if event.kind == EventKind::Thermocouple {
            if let Some(t) = event.payload.as_float() {
                self.set_temperature(t);
            }
        }
    }
}

impl<I2C: I2c> Task for ConductivityTask<I2C> {
    fn name(&self) -> &'static str {
        "Conductivity"
    }

    fn on_enable(&mut self, _ctx: &mut Context<'_>) -> bool {
        self.average.clear();
        true
    }

    fn step(&mut self, ctx: &mut Context<'_>) {
        match self.sample() {
            Ok(ec) => ctx.dispatch(EventKind::Conductivity, Payload::Float(ec)),
            Err(e) => report(ctx, "Conductivity", e),
        }
    }
}
