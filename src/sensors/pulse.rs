//! External encoder unit (0x59) register driver.
//!
//! The same unit serves two roles on this board: a quadrature encoder on
//! the stirrer shaft, and a plain pulse counter on the flow sensor line.
//! Both counters are 32-bit little-endian registers that wrap.

use embedded_hal::i2c::I2c;

use crate::bus::{BusFault, Channel};

const REG_ENCODER: u8 = 0x00;
const REG_RESET: u8 = 0x40;
const REG_ZERO_PULSE: u8 = 0x70;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtEncoder {
    address: u8,
}

impl ExtEncoder {
    pub const fn new(address: u8) -> Self {
        Self { address }
    }

    pub const fn address(&self) -> u8 {
        self.address
    }

    /// Signed quadrature count.
    pub fn read_count<I2C: I2c>(&self, ch: &mut Channel<'_, I2C>) -> Result<i32, BusFault> {
        Ok(i32::from_le_bytes(self.read_u32_bytes(ch, REG_ENCODER)?))
    }

    /// Unsigned pulse count on the zero-pulse input.
    pub fn read_pulses<I2C: I2c>(&self, ch: &mut Channel<'_, I2C>) -> Result<u32, BusFault> {
        Ok(u32::from_le_bytes(self.read_u32_bytes(ch, REG_ZERO_PULSE)?))
    }

    pub fn set_pulses<I2C: I2c>(&self, ch: &mut Channel<'_, I2C>, value: u32) -> Result<(), BusFault> {
        let [a, b, c, d] = value.to_le_bytes();
        ch.write(self.address, &[REG_ZERO_PULSE, a, b, c, d])
    }

    /// Zero the quadrature count.
    pub fn reset_count<I2C: I2c>(&self, ch: &mut Channel<'_, I2C>) -> Result<(), BusFault> {
        ch.write(self.address, &[REG_RESET, 1])
    }

    fn read_u32_bytes<I2C: I2c>(&self, ch: &mut Channel<'_, I2C>, reg: u8) -> Result<[u8; 4], BusFault> {
        let mut buf = [0u8; 4];
        ch.write_read(self.address, &[reg], &mut buf)?;
        Ok(buf)
    }
}

/// Pulses per second between two samples of a wrapping 32-bit counter.
///
/// A raw count lower than the previous one is a wrap, never a negative
/// rate.
pub fn pulse_rate(previous: u32, current: u32, dt_ms: u64) -> Option<f32> {
    if dt_ms == 0 {
        return None;
    }
    let delta = current.wrapping_sub(previous);
    Some(delta as f32 * 1000.0 / dt_ms as f32)
}

/// Signed change of a wrapping 32-bit quadrature count.
pub fn count_delta(previous: i32, current: i32) -> i32 {
    current.wrapping_sub(previous)
}
