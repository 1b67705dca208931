//! Port traits: the boundary between the task set and the radio, the
//! broker client and the serial console.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Task (domain)
//! ```
//!
//! On target the adapters in `adapters::esp` wrap ESP-IDF drivers; host
//! builds use the simulated adapters in `adapters::sim`.  Tasks consume
//! the traits via generics, so no task touches a driver directly.

use heapless::String;

use crate::config::SSID_MAX_LEN;
use crate::error::{BrokerError, Result};

// ───────────────────────────────────────────────────────────────
// Wireless port
// ───────────────────────────────────────────────────────────────

/// One scan result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPoint {
    pub ssid: String<SSID_MAX_LEN>,
    pub bssid: [u8; 6],
    pub channel: u8,
    pub rssi: i8,
}

/// Link state as reported by the radio driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Idle,
    Connecting,
    Connected,
    /// The pinned network is no longer visible.
    NoSsid,
    /// Authentication or association explicitly failed.
    Failed,
    Disconnected,
}

/// WPA2-Enterprise (PEAP) credentials.  The user name doubles as the
/// outer identity.
#[derive(Debug, Clone, Copy)]
pub struct EnterpriseCredentials<'a> {
    pub user: &'a str,
    pub password: &'a str,
}

/// Station-mode radio.
pub trait WifiDriver {
    /// Drop any current or pending association.
    fn disconnect(&mut self);

    /// Blocking scan of visible networks.
    fn scan(&mut self) -> Vec<AccessPoint>;

    /// Start associating with `ap`, pinned to its BSSID and channel.
    /// Returns once the attempt is under way; progress is read back
    /// through [`status`](Self::status).
    fn begin(&mut self, ap: &AccessPoint, credentials: &EnterpriseCredentials<'_>) -> Result<()>;

    fn status(&mut self) -> LinkStatus;
}

// ───────────────────────────────────────────────────────────────
// Broker port
// ───────────────────────────────────────────────────────────────

/// MQTT client session.
pub trait BrokerClient {
    /// Start a session.  Returns once the attempt is under way; whether it
    /// came up is read back through [`is_connected`](Self::is_connected).
    fn connect(&mut self, client_id: &str) -> core::result::Result<(), BrokerError>;

    /// Abandon the session or the attempt in flight.
    fn disconnect(&mut self);

    /// Whether the session is still alive.
    fn is_connected(&mut self) -> bool;

    /// Service keep-alive and pending I/O.
    fn poll(&mut self);

    fn publish(&mut self, topic: &str, payload: &str) -> core::result::Result<(), BrokerError>;
}

/// What the telemetry publisher needs from the broker side.
pub trait Publisher {
    fn is_connected(&self) -> bool;

    fn publish(&mut self, topic: &str, payload: &str) -> core::result::Result<(), BrokerError>;
}

// ───────────────────────────────────────────────────────────────
// Console port
// ───────────────────────────────────────────────────────────────

/// Byte-oriented serial console.
pub trait LineIo {
    /// Next received byte, if any.  Never blocks.
    fn read_byte(&mut self) -> Option<u8>;

    /// Write `line` followed by a newline.
    fn write_line(&mut self, line: &str);
}

// ───────────────────────────────────────────────────────────────
// Time port
// ───────────────────────────────────────────────────────────────

/// Monotonic millisecond clock driving the scheduler.
pub trait Clock {
    fn now_ms(&self) -> u64;
}
