//! One-shot startup probe of the two bus hubs.

use embedded_hal::i2c::I2c;
use log::{info, warn};

use crate::bus::downstream::PortHub;
use crate::bus::SharedBus;
use crate::events::{Event, EventHandler, EventKind};
use crate::scheduler::{Context, Task};

/// Checks that the upstream multiplexer and the downstream port hub
/// acknowledge, reports each as connected or in error, and completes.
pub struct BusProbeTask<I2C> {
    bus: SharedBus<I2C>,
    hub: PortHub,
}

impl<I2C: I2c> BusProbeTask<I2C> {
    pub fn new(bus: SharedBus<I2C>, hub: PortHub) -> Self {
        Self { bus, hub }
    }
}

impl<I2C: I2c> EventHandler for BusProbeTask<I2C> {
    fn handle_event(&mut self, _event: &Event, _ctx: &mut Context<'_>) {}
}

impl<I2C: I2c> Task for BusProbeTask<I2C> {
    fn name(&self) -> &'static str {
        "BusProbe"
    }

    fn on_enable(&mut self, ctx: &mut Context<'_>) -> bool {
        let mux = self.bus.mux().address();
        match self.bus.probe(None, mux) {
            Ok(()) => {
                info!("BusProbe: upstream hub 0x{:02X} connected", mux);
                ctx.signal(EventKind::BusHubConnected);
            }
            Err(e) => {
                warn!("BusProbe: upstream hub: {}", e);
                ctx.signal(EventKind::BusHubError);
            }
        }

        match self.hub.probe(&self.bus) {
            Ok(()) => {
                info!(
                    "BusProbe: port hub 0x{:02X} connected on port {}",
                    self.hub.address(),
                    self.hub.upstream_port()
                );
                ctx.signal(EventKind::PortHubConnected);
            }
            Err(e) => {
                warn!("BusProbe: port hub: {}", e);
                ctx.signal(EventKind::PortHubError);
            }
        }
        false
    }

    fn step(&mut self, _ctx: &mut Context<'_>) {}
}
