//! H-bridge motor driver unit (0x20) register access.

use embedded_hal::i2c::I2c;

use crate::bus::{BusFault, Channel};

const REG_DIRECTION: u8 = 0x00;
const REG_SPEED_8BIT: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Stop = 0,
    Forward = 1,
    Reverse = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HBridge {
    address: u8,
}

impl HBridge {
    pub const fn new(address: u8) -> Self {
        Self { address }
    }

    pub const fn address(&self) -> u8 {
        self.address
    }

    pub fn set_direction<I2C: I2c>(&self, ch: &mut Channel<'_, I2C>, direction: Direction) -> Result<(), BusFault> {
        ch.write(self.address, &[REG_DIRECTION, direction as u8])
    }

    /// Drive duty, `0..=255`.
    pub fn set_speed<I2C: I2c>(&self, ch: &mut Channel<'_, I2C>, speed: u8) -> Result<(), BusFault> {
        ch.write(self.address, &[REG_SPEED_8BIT, speed])
    }
}
