//! Unified error types for the stirtank firmware.
//!
//! Every per-tick fault is handled by the task that owns the failing
//! resource; these types exist so that handling is uniform and so the
//! startup path can report the one fatal class (`ConfigurationMissing`)
//! before any task is enabled.

use core::fmt;

use crate::bus::BusFault;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Error {
    /// A bus address did not acknowledge.  Always recoverable.
    Bus(BusFault),
    /// A reading fell outside physical plausibility and was discarded.
    SensorInvalid(SensorError),
    /// Wireless association failed with a named reason.
    AssociationFailure(&'static str),
    /// The message broker refused the connection or stopped answering.
    BrokerUnavailable(BrokerError),
    /// A required startup value is absent.  Fatal.
    ConfigurationMissing(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "bus: {e}"),
            Self::SensorInvalid(e) => write!(f, "sensor: {e}"),
            Self::AssociationFailure(reason) => write!(f, "association failed: {reason}"),
            Self::BrokerUnavailable(e) => write!(f, "broker: {e}"),
            Self::ConfigurationMissing(key) => write!(f, "config: missing required value '{key}'"),
        }
    }
}

impl core::error::Error for Error {}

impl From<BusFault> for Error {
    fn from(e: BusFault) -> Self {
        Self::Bus(e)
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorError {
    /// Value is not a finite number (division by a zero time base, etc).
    NotFinite,
    /// Value is outside the range the device can physically produce.
    OutOfRange(f32),
    /// Two samples arrived with no elapsed time between them.
    ZeroInterval,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFinite => write!(f, "reading not finite"),
            Self::OutOfRange(v) => write!(f, "reading {v} out of range"),
            Self::ZeroInterval => write!(f, "zero sample interval"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::SensorInvalid(e)
    }
}

// ---------------------------------------------------------------------------
// Broker errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker refused or never answered the connect request.
    ConnectRefused,
    /// An established session stopped answering.
    LivenessLost,
    /// Not associated with a network; no attempt was made.
    NoNetwork,
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectRefused => write!(f, "connect refused"),
            Self::LivenessLost => write!(f, "liveness lost"),
            Self::NoNetwork => write!(f, "no network"),
        }
    }
}

impl From<BrokerError> for Error {
    fn from(e: BrokerError) -> Self {
        Self::BrokerUnavailable(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_missing_names_the_key() {
        let e = Error::ConfigurationMissing("wifiPass");
        assert_eq!(e.to_string(), "config: missing required value 'wifiPass'");
    }

    #[test]
    fn bus_fault_converts() {
        let e: Error = BusFault::NoAcknowledge { address: 0x70 }.into();
        assert!(matches!(e, Error::Bus(BusFault::NoAcknowledge { address: 0x70 })));
    }
}
