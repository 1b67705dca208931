//! Fuzz target: `SystemConfig::from_json`
//!
//! Invariants checked:
//! - No panics on any input text
//! - An accepted document always has every required value present
//! - Calibration factors are always positive and finite
//!
//! cargo fuzz run fuzz_config

#![no_main]

use libfuzzer_sys::fuzz_target;
use stirtank::config::SystemConfig;

const REQUIRED: [&str; 5] = ["deviceId", "wifiUser", "wifiPass", "mqttServer", "mqttPort"];

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    match SystemConfig::from_json(text) {
        Ok(c) => {
            assert!(!c.device_id.is_empty());
            assert!(!c.network.wifi_user.is_empty());
            assert!(!c.network.mqtt_server.is_empty());
            assert_ne!(c.network.mqtt_port, 0);
            assert!(!c.network.wifi_ssid.is_empty());
            for f in [c.flow.flow_k, c.flow.flow_correct_k, c.ec_k_value] {
                assert!(f.is_finite() && f > 0.0, "factor {f}");
            }
            assert!(c.flow.window >= 1);
        }
        Err(e) => {
            if let Some(key) = e.missing_key() {
                assert!(REQUIRED.contains(&key), "unknown key {key}");
            }
        }
    }
});
