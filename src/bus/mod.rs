//! Shared I²C bus arbitration.
//!
//! The board has one physical bus fanned out through two levels of
//! channel selection:
//!
//! ```text
//!   MCU ── I²C root ── UpstreamMux (0x70, 8 ports)
//!                        ├─ port 0: encoder unit 0x59, H-bridge 0x20
//!                        ├─ port 1: H-bridge 0x20
//!                        ├─ port 2: PortHub (0x61, 6 ports)
//!                        │            ├─ hub 0: angle sensor 1
//!                        │            ├─ hub 1: angle sensor 2
//!                        │            └─ hub 2: conductivity probe
//!                        ├─ port 3: thermocouple 0x66
//!                        └─ port 5: encoder unit 0x59 (flow)
//! ```
//!
//! Several devices share an address on different ports, so every
//! transaction must re-select its upstream port.  [`BusArbiter::transaction`]
//! is the only way to reach the raw bus and always selects first.

pub mod downstream;
pub mod upstream;

#[cfg(not(target_os = "espidf"))]
pub mod sim;

use core::cell::{Cell, RefCell};
use core::fmt;
use std::rc::Rc;

use embedded_hal::i2c::{Error as _, ErrorKind, I2c};
use log::{debug, info, warn};

use downstream::HubPort;
use upstream::UpstreamMux;

// ═══════════════════════════════════════════════════════════════
//  Faults
// ═══════════════════════════════════════════════════════════════

/// A failed bus operation.  Always recoverable; the owning task retries
/// on its next poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusFault {
    /// The addressed device did not acknowledge.
    NoAcknowledge { address: u8 },
    /// Any other transfer failure (arbitration loss, overrun, ...).
    Transfer { address: u8, kind: ErrorKind },
    /// The requested channel does not exist on the multiplexer.
    InvalidChannel(u8),
    /// The bus was already borrowed by an enclosing transaction.
    Contended,
}

impl BusFault {
    /// Classify a HAL error raised while talking to `address`.
    pub fn from_i2c<E: embedded_hal::i2c::Error>(address: u8, e: &E) -> Self {
        match e.kind() {
            ErrorKind::NoAcknowledge(_) => Self::NoAcknowledge { address },
            kind => Self::Transfer { address, kind },
        }
    }

    /// Address of the device that failed, if the fault names one.
    pub fn address(&self) -> Option<u8> {
        match *self {
            Self::NoAcknowledge { address } | Self::Transfer { address, .. } => Some(address),
            Self::InvalidChannel(_) | Self::Contended => None,
        }
    }
}

impl fmt::Display for BusFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAcknowledge { address } => write!(f, "no acknowledge from 0x{address:02X}"),
            Self::Transfer { address, kind } => write!(f, "transfer to 0x{address:02X} failed: {kind}"),
            Self::InvalidChannel(port) => write!(f, "invalid channel {port}"),
            Self::Contended => write!(f, "bus already in use"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Channel path
// ═══════════════════════════════════════════════════════════════

/// Where a device lives: an upstream port and, for hub devices, the
/// downstream hub port behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelPath {
    pub upstream: u8,
    pub downstream: Option<HubPort>,
}

impl ChannelPath {
    pub const fn upstream(port: u8) -> Self {
        Self {
            upstream: port,
            downstream: None,
        }
    }

    pub const fn hub(upstream: u8, port: HubPort) -> Self {
        Self {
            upstream,
            downstream: Some(port),
        }
    }
}

impl fmt::Display for ChannelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.downstream {
            Some(port) => write!(f, "{}/{}", self.upstream, port.index()),
            None => write!(f, "{}", self.upstream),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Channel handle
// ═══════════════════════════════════════════════════════════════

/// Access to the bus while one upstream port is selected.  Only handed
/// out inside [`BusArbiter::transaction`].
pub struct Channel<'a, I2C> {
    i2c: &'a mut I2C,
}

impl<I2C: I2c> Channel<'_, I2C> {
    pub fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusFault> {
        self.i2c
            .write(address, bytes)
            .map_err(|e| BusFault::from_i2c(address, &e))
    }

    pub fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), BusFault> {
        self.i2c
            .read(address, buf)
            .map_err(|e| BusFault::from_i2c(address, &e))
    }

    /// Register read with a repeated start between the write and the read.
    pub fn write_read(&mut self, address: u8, bytes: &[u8], buf: &mut [u8]) -> Result<(), BusFault> {
        self.i2c
            .write_read(address, bytes, buf)
            .map_err(|e| BusFault::from_i2c(address, &e))
    }

    /// Zero-length write; succeeds only if `address` acknowledges.
    pub fn probe(&mut self, address: u8) -> Result<(), BusFault> {
        self.write(address, &[])
    }
}

// ═══════════════════════════════════════════════════════════════
//  Arbiter
// ═══════════════════════════════════════════════════════════════

/// Owner of the bus and the upstream multiplexer.
///
/// Tasks share it through [`SharedBus`].  Borrows of the underlying
/// driver never outlive one `transaction` call.
pub struct BusArbiter<I2C> {
    i2c: RefCell<I2C>,
    mux: UpstreamMux,
    selected: Cell<Option<u8>>,
    faults: Cell<u32>,
}

/// Handle shared by every device task.
pub type SharedBus<I2C> = Rc<BusArbiter<I2C>>;

impl<I2C: I2c> BusArbiter<I2C> {
    pub fn new(i2c: I2C, mux: UpstreamMux) -> Self {
        Self {
            i2c: RefCell::new(i2c),
            mux,
            selected: Cell::new(None),
            faults: Cell::new(0),
        }
    }

    pub fn shared(self) -> SharedBus<I2C> {
        Rc::new(self)
    }

    pub fn mux(&self) -> &UpstreamMux {
        &self.mux
    }

    /// Upstream port most recently selected.  Diagnostics only; every
    /// transaction re-selects regardless.
    pub fn selected(&self) -> Option<u8> {
        self.selected.get()
    }

    /// Total failed selects and transactions since boot.
    pub fn fault_count(&self) -> u32 {
        self.faults.get()
    }

    /// Select an upstream port without doing anything on it.
    pub fn select(&self, port: u8) -> Result<(), BusFault> {
        self.transaction(port, |_| Ok(()))
    }

    /// Select `port`, then run `f` against the bus.
    ///
    /// A failed select short-circuits and `f` is never called.
    pub fn transaction<T>(
        &self,
        port: u8,
        f: impl FnOnce(&mut Channel<'_, I2C>) -> Result<T, BusFault>,
    ) -> Result<T, BusFault> {
        let mut i2c = self.i2c.try_borrow_mut().map_err(|_| BusFault::Contended)?;

        if let Err(e) = self.mux.select(&mut *i2c, port) {
            self.selected.set(None);
            self.record_fault(&e);
            return Err(e);
        }
        self.selected.set(Some(port));

        let mut channel = Channel { i2c: &mut *i2c };
        f(&mut channel).inspect_err(|e| self.record_fault(e))
    }

    /// Run `f` against a device wired straight to an upstream port.
    ///
    /// Hub paths are rejected; devices behind the hub are reached through
    /// [`PortHub`](downstream::PortHub), which issues the hub command.
    pub fn transaction_at<T>(
        &self,
        path: ChannelPath,
        f: impl FnOnce(&mut Channel<'_, I2C>) -> Result<T, BusFault>,
    ) -> Result<T, BusFault> {
        if path.downstream.is_some() {
            return Err(BusFault::InvalidChannel(path.upstream));
        }
        self.transaction(path.upstream, f)
    }

    /// Probe for an acknowledge from `address` on the given upstream
    /// port, or on the root bus when `port` is `None`.
    pub fn probe(&self, port: Option<u8>, address: u8) -> Result<(), BusFault> {
        match port {
            Some(port) => self.transaction(port, |ch| ch.probe(address)),
            None => {
                let mut i2c = self.i2c.try_borrow_mut().map_err(|_| BusFault::Contended)?;
                Channel { i2c: &mut *i2c }.probe(address)
            }
        }
    }

    /// Probe addresses `1..127` on the root bus.  Startup diagnostics only.
    pub fn scan(&self) -> Vec<u8> {
        let Ok(mut i2c) = self.i2c.try_borrow_mut() else {
            warn!("Bus: scan skipped, bus busy");
            return Vec::new();
        };
        let mut channel = Channel { i2c: &mut *i2c };
        let found: Vec<u8> = (1..127u8).filter(|&a| channel.probe(a).is_ok()).collect();
        for address in &found {
            info!("Bus: device found at 0x{:02X}", address);
        }
        if found.is_empty() {
            warn!("Bus: no devices found");
        }
        found
    }

    /// Select `port`, then scan it.
    pub fn scan_port(&self, port: u8) -> Result<Vec<u8>, BusFault> {
        self.select(port)?;
        debug!("Bus: scanning upstream port {}", port);
        Ok(self.scan())
    }

    fn record_fault(&self, e: &BusFault) {
        self.faults.set(self.faults.get().wrapping_add(1));
        debug!("Bus: {}", e);
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
