//! Thermocouple amplifier unit (0x66).
//!
//! Two hardware revisions answer on the same address with different
//! temperature encodings.  The version register tells them apart:
//!
//! | variant  | version (`0xFE`) | temperature (`0x00`, 2 bytes)  |
//! |----------|------------------|--------------------------------|
//! | standard | 0                | big-endian, 1/16 °C            |
//! | ISO      | > 0              | little-endian, 1/100 °C        |
//!
//! Both encodings are two's complement.

use embedded_hal::i2c::I2c;
use log::info;

use crate::bus::{ChannelPath, SharedBus};
use crate::error::Error;
use crate::events::{Event, EventHandler, EventKind, Payload};
use crate::scheduler::{Context, Task};

use super::{plausible, report};

const REG_TEMPERATURE: u8 = 0x00;
const REG_VERSION: u8 = 0xFE;

/// K-type measurable range, °C.
const MIN_C: f32 = -200.0;
const MAX_C: f32 = 1372.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Standard,
    Iso,
}

impl Variant {
    pub fn from_version(version: u8) -> Self {
        if version > 0 { Self::Iso } else { Self::Standard }
    }

    /// Decode the two temperature register bytes.
    pub fn decode(self, bytes: [u8; 2]) -> f32 {
        match self {
            Self::Iso => f32::from(i16::from_le_bytes(bytes)) / 100.0,
            Self::Standard => f32::from(i16::from_be_bytes(bytes)) / 16.0,
        }
    }
}

pub struct ThermocoupleTask<I2C> {
    bus: SharedBus<I2C>,
    path: ChannelPath,
    address: u8,
    variant: Option<Variant>,
    connected: bool,
    last_value: Option<f32>,
}

impl<I2C: I2c> ThermocoupleTask<I2C> {
    pub fn new(bus: SharedBus<I2C>, path: ChannelPath, address: u8) -> Self {
        Self {
            bus,
            path,
            address,
            variant: None,
            connected: false,
            last_value: None,
        }
    }

    /// Hardware revision, once it has been probed.
    pub fn variant(&self) -> Option<Variant> {
        self.variant
    }

    pub fn last_value(&self) -> Option<f32> {
        self.last_value
    }

    /// Read the temperature, probing the variant on the first access.
    pub fn sample(&mut self) -> Result<f32, Error> {
        let address = self.address;
        let cached = self.variant;
        let (variant, bytes) = self.bus.transaction_at(self.path, |ch| {
            let variant = match cached {
                Some(v) => v,
                None => {
                    let mut version = [0u8; 1];
                    ch.write_read(address, &[REG_VERSION], &mut version)?;
                    Variant::from_version(version[0])
                }
            };
            let mut bytes = [0u8; 2];
            ch.write_read(address, &[REG_TEMPERATURE], &mut bytes)?;
            Ok((variant, bytes))
        })?;

        if self.variant.is_none() {
            info!("Thermocouple: {:?} unit detected", variant);
            self.variant = Some(variant);
        }

        let celsius = plausible(variant.decode(bytes), MIN_C, MAX_C)?;
        self.last_value = Some(celsius);
        Ok(celsius)
    }
}

impl<I2C: I2c> EventHandler for ThermocoupleTask<I2C> {
    fn handle_event(&mut self, _event: &Event, _ctx: &mut Context<'_>) {}
}

impl<I2C: I2c> Task for ThermocoupleTask<I2C> {
    fn name(&self) -> &'static str {
        "Thermocouple"
    }

    fn step(&mut self, ctx: &mut Context<'_>) {
        match self.sample() {
            Ok(celsius) => {
                if !self.connected {
                    self.connected = true;
                    ctx.signal(EventKind::ThermocoupleConnected);
                }
                ctx.dispatch(EventKind::Thermocouple, Payload::Float(celsius));
            }
            Err(e) => report(ctx, "Thermocouple", e),
        }
    }
}
