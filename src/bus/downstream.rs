//! Downstream 6-port I/O hub (PbHub-compatible).
//!
//! The hub sits behind one upstream multiplexer port.  Every request is a
//! single command byte, `port_prefix | op`, optionally followed by data:
//!
//! | op            | byte        | data      | reply                |
//! |---------------|-------------|-----------|----------------------|
//! | digital write | `0x00\|pin` | 1 byte    |                      |
//! | analog write  | `0x02\|pin` | 1 byte    |                      |
//! | digital read  | `0x04\|pin` |           | 1 byte               |
//! | analog read   | `0x06`      |           | 2 bytes, little-end. |

use embedded_hal::i2c::I2c;

use super::{BusArbiter, BusFault, Channel, ChannelPath};

const OP_DIGITAL_WRITE: u8 = 0x00;
const OP_ANALOG_WRITE: u8 = 0x02;
const OP_DIGITAL_READ: u8 = 0x04;
const OP_ANALOG_READ: u8 = 0x06;

/// One of the hub's six ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubPort {
    P0,
    P1,
    P2,
    P3,
    P4,
    P5,
}

impl HubPort {
    pub const ALL: [Self; 6] = [Self::P0, Self::P1, Self::P2, Self::P3, Self::P4, Self::P5];

    /// Command prefix the hub decodes for this port.
    pub const fn prefix(self) -> u8 {
        match self {
            Self::P0 => 0x40,
            Self::P1 => 0x50,
            Self::P2 => 0x60,
            Self::P3 => 0x70,
            Self::P4 => 0x80,
            Self::P5 => 0xA0,
        }
    }

    pub const fn index(self) -> u8 {
        match self {
            Self::P0 => 0,
            Self::P1 => 1,
            Self::P2 => 2,
            Self::P3 => 3,
            Self::P4 => 4,
            Self::P5 => 5,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }
}

/// Signal pin within a hub port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubPin {
    Pin0 = 0,
    Pin1 = 1,
}

/// The hub itself: its address and the upstream port it hangs off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortHub {
    address: u8,
    upstream_port: u8,
}

impl PortHub {
    pub const fn new(address: u8, upstream_port: u8) -> Self {
        Self {
            address,
            upstream_port,
        }
    }

    pub const fn address(&self) -> u8 {
        self.address
    }

    pub const fn upstream_port(&self) -> u8 {
        self.upstream_port
    }

    /// Path to `port` on this hub.
    pub const fn path(&self, port: HubPort) -> ChannelPath {
        ChannelPath::hub(self.upstream_port, port)
    }

    /// Hub port addressed by `path`.  Paths that do not end on this hub are
    /// rejected before touching the bus.
    fn port_on(&self, path: ChannelPath) -> Result<HubPort, BusFault> {
        match path.downstream {
            Some(port) if path.upstream == self.upstream_port => Ok(port),
            _ => Err(BusFault::InvalidChannel(path.upstream)),
        }
    }

    /// Address `port` with `op`.  Must run inside a transaction on the
    /// hub's upstream port.
    pub fn select<I2C: I2c>(
        &self,
        ch: &mut Channel<'_, I2C>,
        port: HubPort,
        op: u8,
        data: Option<u8>,
    ) -> Result<(), BusFault> {
        let command = port.prefix() | op;
        match data {
            Some(value) => ch.write(self.address, &[command, value]),
            None => ch.write(self.address, &[command]),
        }
    }

    /// 12-bit ADC sample from the hub port at the end of `path`.
    pub fn analog_read<I2C: I2c>(&self, bus: &BusArbiter<I2C>, path: ChannelPath) -> Result<u16, BusFault> {
        let port = self.port_on(path)?;
        bus.transaction(path.upstream, |ch| {
            self.select(ch, port, OP_ANALOG_READ, None)?;
            let mut buf = [0u8; 2];
            ch.read(self.address, &mut buf)?;
            Ok(u16::from_le_bytes(buf))
        })
    }

    pub fn digital_read<I2C: I2c>(
        &self,
        bus: &BusArbiter<I2C>,
        path: ChannelPath,
        pin: HubPin,
    ) -> Result<bool, BusFault> {
        let port = self.port_on(path)?;
        bus.transaction(path.upstream, |ch| {
            self.select(ch, port, OP_DIGITAL_READ | pin as u8, None)?;
            let mut buf = [0u8; 1];
            ch.read(self.address, &mut buf)?;
            Ok(buf[0] != 0)
        })
    }

    pub fn digital_write<I2C: I2c>(
        &self,
        bus: &BusArbiter<I2C>,
        path: ChannelPath,
        pin: HubPin,
        high: bool,
    ) -> Result<(), BusFault> {
        let port = self.port_on(path)?;
        bus.transaction(path.upstream, |ch| {
            self.select(ch, port, OP_DIGITAL_WRITE | pin as u8, Some(u8::from(high)))
        })
    }

    /// PWM duty `0..=255` on `pin`.
    pub fn analog_write<I2C: I2c>(
        &self,
        bus: &BusArbiter<I2C>,
        path: ChannelPath,
        pin: HubPin,
        duty: u8,
    ) -> Result<(), BusFault> {
        let port = self.port_on(path)?;
        bus.transaction(path.upstream, |ch| {
            self.select(ch, port, OP_ANALOG_WRITE | pin as u8, Some(duty))
        })
    }

    /// Check that the hub acknowledges.
    pub fn probe<I2C: I2c>(&self, bus: &BusArbiter<I2C>) -> Result<(), BusFault> {
        bus.probe(Some(self.upstream_port), self.address)
    }
}
