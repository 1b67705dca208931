//! ESP-IDF adapters for the port traits.
//!
//! | Adapter        | Implements     | Connects to                       |
//! |----------------|----------------|-----------------------------------|
//! | `EspRadio`     | `WifiDriver`   | `EspWifi` station, WPA2-Enterprise |
//! | `EspBroker`    | `BrokerClient` | `EspMqttClient`                   |
//! | `UartConsole`  | `LineIo`       | UART0 (shared with the logger)    |
//!
//! The I²C bus needs no adapter: `I2cDriver` implements `embedded_hal`'s
//! `I2c` directly.

use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use esp_idf_hal::delay::NON_BLOCK;
use esp_idf_hal::uart::UartDriver;
use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration, QoS};
use esp_idf_svc::sys::{self, EspError};
use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi, ScanConfig};
use log::{debug, warn};

use crate::app::ports::{AccessPoint, BrokerClient, EnterpriseCredentials, LineIo, LinkStatus, WifiDriver};
use crate::error::{BrokerError, Error, Result};

// ───────────────────────────────────────────────────────────────
// Radio
// ───────────────────────────────────────────────────────────────

pub struct EspRadio {
    wifi: EspWifi<'static>,
    attempting: bool,
}

impl EspRadio {
    pub fn new(mut wifi: EspWifi<'static>) -> core::result::Result<Self, EspError> {
        wifi.set_configuration(&Configuration::Client(ClientConfiguration::default()))?;
        wifi.start()?;
        Ok(Self {
            wifi,
            attempting: false,
        })
    }

    fn set_enterprise(credentials: &EnterpriseCredentials<'_>) -> core::result::Result<(), EspError> {
        let user = credentials.user.as_bytes();
        let pass = credentials.password.as_bytes();
        // SAFETY: the supplicant copies each buffer before returning.
        unsafe {
            sys::esp!(sys::esp_eap_client_set_identity(user.as_ptr(), user.len() as i32))?;
            sys::esp!(sys::esp_eap_client_set_username(user.as_ptr(), user.len() as i32))?;
            sys::esp!(sys::esp_eap_client_set_password(pass.as_ptr(), pass.len() as i32))?;
            sys::esp!(sys::esp_wifi_sta_enterprise_enable())?;
        }
        Ok(())
    }
}

impl WifiDriver for EspRadio {
    fn disconnect(&mut self) {
        self.attempting = false;
        if let Err(e) = self.wifi.disconnect() {
            debug!("Wifi: disconnect: {}", e);
        }
    }

    fn scan(&mut self) -> Vec<AccessPoint> {
        let found = self
            .wifi
            .start_scan(&ScanConfig::default(), true)
            .and_then(|()| self.wifi.get_scan_result());
        match found {
            Ok(aps) => aps
                .into_iter()
                .filter_map(|ap| {
                    Some(AccessPoint {
                        ssid: heapless::String::try_from(ap.ssid.as_str()).ok()?,
                        bssid: ap.bssid,
                        channel: ap.channel,
                        rssi: ap.signal_strength,
                    })
                })
                .collect(),
            Err(e) => {
                warn!("Wifi: scan failed: {}", e);
                Vec::new()
            }
        }
    }

    fn begin(&mut self, ap: &AccessPoint, credentials: &EnterpriseCredentials<'_>) -> Result<()> {
        let config = Configuration::Client(ClientConfiguration {
            ssid: ap.ssid.clone(),
            bssid: Some(ap.bssid),
            channel: Some(ap.channel),
            auth_method: AuthMethod::WPA2Enterprise,
            ..Default::default()
        });
        self.wifi
            .set_configuration(&config)
            .and_then(|()| Self::set_enterprise(credentials))
            .and_then(|()| self.wifi.connect())
            .map_err(|e| {
                warn!("Wifi: begin: {}", e);
                Error::AssociationFailure("Failed")
            })?;
        self.attempting = true;
        Ok(())
    }

    fn status(&mut self) -> LinkStatus {
        match self.wifi.is_connected() {
            Ok(true) => LinkStatus::Connected,
            Ok(false) if self.attempting => LinkStatus::Connecting,
            Ok(false) => LinkStatus::Disconnected,
            Err(_) => LinkStatus::Failed,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Broker
// ───────────────────────────────────────────────────────────────

pub struct EspBroker {
    url: String,
    client: Option<EspMqttClient<'static>>,
    connected: Arc<AtomicBool>,
}

impl EspBroker {
    pub fn new(server: &str, port: u16) -> Self {
        Self {
            url: format!("mqtt://{server}:{port}"),
            client: None,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl BrokerClient for EspBroker {
    /// Create the client if there is none.  The ESP-IDF client connects
    /// from its own task; the callback flips the connection flag.
    fn connect(&mut self, client_id: &str) -> core::result::Result<(), BrokerError> {
        if self.client.is_some() {
            return Ok(());
        }
        let flag = Arc::clone(&self.connected);
        let conf = MqttClientConfiguration {
            client_id: Some(client_id),
            ..Default::default()
        };
        let client = EspMqttClient::new_cb(&self.url, &conf, move |event| match event.payload() {
            EventPayload::Connected(_) => flag.store(true, Ordering::Release),
            EventPayload::Disconnected => flag.store(false, Ordering::Release),
            _ => {}
        })
        .map_err(|e| {
            warn!("MQTT: client for {}: {}", self.url, e);
            BrokerError::ConnectRefused
        })?;
        self.client = Some(client);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.client = None;
        self.connected.store(false, Ordering::Release);
    }

    fn is_connected(&mut self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// The ESP-IDF client runs its own task; nothing to service here.
    fn poll(&mut self) {}

    fn publish(&mut self, topic: &str, payload: &str) -> core::result::Result<(), BrokerError> {
        let client = self.client.as_mut().ok_or(BrokerError::NoNetwork)?;
        client
            .enqueue(topic, QoS::AtMostOnce, false, payload.as_bytes())
            .map(|_| ())
            .map_err(|_| BrokerError::LivenessLost)
    }
}

// ───────────────────────────────────────────────────────────────
// Console
// ───────────────────────────────────────────────────────────────

/// UART console handle.  Clones share one driver.
#[derive(Clone)]
pub struct UartConsole(Rc<UartDriver<'static>>);

impl UartConsole {
    pub fn new(uart: UartDriver<'static>) -> Self {
        Self(Rc::new(uart))
    }
}

impl LineIo for UartConsole {
    fn read_byte(&mut self) -> Option<u8> {
        let mut buf = [0u8; 1];
        match self.0.read(&mut buf, NON_BLOCK) {
            Ok(1) => Some(buf[0]),
            _ => None,
        }
    }

    fn write_line(&mut self, line: &str) {
        let written = self
            .0
            .write(line.as_bytes())
            .and_then(|_| self.0.write(b"\r\n"));
        if let Err(e) = written {
            debug!("Console: write failed: {}", e);
        }
    }
}
