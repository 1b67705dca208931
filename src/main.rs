//! Stirred-tank controller firmware entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                     │
//! │                                                              │
//! │  I2cDriver      EspRadio        EspBroker      UartConsole   │
//! │  (I2c)          (WifiDriver)    (BrokerClient) (LineIo)      │
//! │                                                              │
//! │  ─────────────── Port Trait Boundary ────────────────────    │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │  Firmware: Scheduler · EventBus · BusArbiter · tasks   │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::AnyIOPin;
use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::uart::{config::Config as UartConfig, UartDriver};
use esp_idf_hal::units::Hertz;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::EspWifi;
use log::{error, info};

use stirtank::adapters::esp::{EspBroker, EspRadio, UartConsole};
use stirtank::adapters::time::MonotonicClock;
use stirtank::app::ports::Clock;
use stirtank::app::service::{Adapters, Firmware, VERSION};
use stirtank::config::SystemConfig;
use stirtank::pins;

/// Device configuration, baked in at build time.
const CONFIG_JSON: &str = include_str!("../config/device.json");

/// Main loop yield between scheduler ticks.
const LOOP_DELAY_MS: u32 = 5;

fn halt() -> ! {
    loop {
        FreeRtos::delay_ms(1000);
    }
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Stirtank v{}                        ║", VERSION);
    info!("╚══════════════════════════════════════╝");

    // ── 2. Configuration ──────────────────────────────────────
    let config = match SystemConfig::from_json(CONFIG_JSON) {
        Ok(c) => c,
        Err(e) => {
            match e.missing_key() {
                Some(key) => error!("Config: required value '{}' missing, halting", key),
                None => error!("Config: {}, halting", e),
            }
            halt();
        }
    };
    info!("Device ID: {}", config.device_id);

    // ── 3. Peripherals ────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    // SAFETY: the bus and console pins are wired only to these drivers;
    // nothing else takes them from `peripherals.pins`.
    let (sda, scl, tx, rx) = unsafe {
        (
            AnyIOPin::new(pins::I2C_SDA_GPIO),
            AnyIOPin::new(pins::I2C_SCL_GPIO),
            AnyIOPin::new(pins::UART_TX_GPIO),
            AnyIOPin::new(pins::UART_RX_GPIO),
        )
    };

    let i2c = I2cDriver::new(
        peripherals.i2c0,
        sda,
        scl,
        &I2cConfig::new().baudrate(Hertz(pins::I2C_BAUD_HZ)),
    )?;

    let uart = UartDriver::new(
        peripherals.uart0,
        tx,
        rx,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &UartConfig::default().baudrate(Hertz(pins::UART_BAUD)),
    )?;

    let wifi = EspRadio::new(EspWifi::new(peripherals.modem, sysloop, Some(nvs))?)?;
    let broker = EspBroker::new(&config.network.mqtt_server, config.network.mqtt_port);

    // ── 4. Assemble and start ─────────────────────────────────
    let mut firmware = Firmware::assemble(
        &config,
        Adapters {
            i2c,
            wifi,
            broker,
            console: UartConsole::new(uart),
        },
    );

    let found = firmware.bus().scan();
    info!("Bus: {} device(s) on the root bus", found.len());

    firmware.start();

    // ── 5. Run ────────────────────────────────────────────────
    let clock = MonotonicClock::new();
    loop {
        firmware.tick(clock.now_ms());
        FreeRtos::delay_ms(LOOP_DELAY_MS);
    }
}
