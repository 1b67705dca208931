//! Pin and bus address assignments for the stirred-tank controller board.
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding addresses or channel numbers.

use crate::bus::ChannelPath;
use crate::bus::downstream::HubPort;

// ---------------------------------------------------------------------------
// I²C root bus
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 32;
pub const I2C_SCL_GPIO: i32 = 33;
/// Standard-mode clock; the hub and thermocouple unit do not do fast-mode.
pub const I2C_BAUD_HZ: u32 = 100_000;

// ---------------------------------------------------------------------------
// Upstream multiplexer (8 ports)
// ---------------------------------------------------------------------------

pub const UPSTREAM_MUX_ADDR: u8 = 0x70;

/// Stirrer encoder and stirrer H-bridge.
pub const PORT_STIRRER: u8 = 0;
/// Pump H-bridge.
pub const PORT_PUMP: u8 = 1;
/// Downstream port hub.
pub const PORT_HUB: u8 = 2;
pub const PORT_THERMOCOUPLE: u8 = 3;
/// External encoder unit wired to the flow sensor pulse line.
pub const PORT_FLOW: u8 = 5;

// ---------------------------------------------------------------------------
// Downstream port hub (6 ports)
// ---------------------------------------------------------------------------

pub const PORT_HUB_ADDR: u8 = 0x61;

pub const HUB_ANGLE_1: HubPort = HubPort::P0;
pub const HUB_ANGLE_2: HubPort = HubPort::P1;
pub const HUB_CONDUCTIVITY: HubPort = HubPort::P2;

// ---------------------------------------------------------------------------
// Device channel paths
// ---------------------------------------------------------------------------

pub const PATH_STIRRER: ChannelPath = ChannelPath::upstream(PORT_STIRRER);
pub const PATH_PUMP: ChannelPath = ChannelPath::upstream(PORT_PUMP);
pub const PATH_THERMOCOUPLE: ChannelPath = ChannelPath::upstream(PORT_THERMOCOUPLE);
pub const PATH_FLOW: ChannelPath = ChannelPath::upstream(PORT_FLOW);
pub const PATH_ANGLE_1: ChannelPath = ChannelPath::hub(PORT_HUB, HUB_ANGLE_1);
pub const PATH_ANGLE_2: ChannelPath = ChannelPath::hub(PORT_HUB, HUB_ANGLE_2);
pub const PATH_CONDUCTIVITY: ChannelPath = ChannelPath::hub(PORT_HUB, HUB_CONDUCTIVITY);

// ---------------------------------------------------------------------------
// Devices behind the multiplexer
// ---------------------------------------------------------------------------

pub const THERMOCOUPLE_ADDR: u8 = 0x66;
pub const HBRIDGE_ADDR: u8 = 0x20;
pub const ENCODER_UNIT_ADDR: u8 = 0x59;

// ---------------------------------------------------------------------------
// UART (operator console)
// ---------------------------------------------------------------------------

pub const UART_BAUD: u32 = 115_200;
pub const UART_TX_GPIO: i32 = 1;
pub const UART_RX_GPIO: i32 = 3;
