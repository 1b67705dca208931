//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter    | Implements                        | Connects to            |
//! |------------|-----------------------------------|------------------------|
//! | `esp`      | WifiDriver, BrokerClient, LineIo  | ESP-IDF WiFi, MQTT, UART |
//! | `log_sink` | (task)                            | Logger + serial echo   |
//! | `sim`      | WifiDriver, BrokerClient, LineIo  | In-memory simulators   |
//! | `time`     | Clock                             | ESP32 system timer     |

#[cfg(target_os = "espidf")]
pub mod esp;
pub mod log_sink;
#[cfg(not(target_os = "espidf"))]
pub mod sim;
pub mod time;
