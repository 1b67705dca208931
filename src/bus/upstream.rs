//! Upstream 8-port I²C multiplexer (TCA9548A-compatible).
//!
//! One control register: writing `1 << port` connects downstream bus
//! `port` to the root bus and disconnects all others.

use embedded_hal::i2c::I2c;

use super::BusFault;

/// Number of downstream buses behind the multiplexer.
pub const UPSTREAM_PORTS: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpstreamMux {
    address: u8,
}

impl UpstreamMux {
    pub const fn new(address: u8) -> Self {
        Self { address }
    }

    pub const fn address(&self) -> u8 {
        self.address
    }

    /// Connect downstream bus `port`.  Fails if the port does not exist or
    /// the multiplexer does not acknowledge.
    pub fn select<I2C: I2c>(&self, i2c: &mut I2C, port: u8) -> Result<(), BusFault> {
        if port >= UPSTREAM_PORTS {
            return Err(BusFault::InvalidChannel(port));
        }
        i2c.write(self.address, &[1 << port])
            .map_err(|e| BusFault::from_i2c(self.address, &e))
    }
}
