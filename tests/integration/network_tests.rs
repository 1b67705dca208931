//! Association, broker session and telemetry lifecycle over the
//! simulated radio and broker.

use crate::mock_hw::{DEVICE_ID, Rig};

use stirtank::app::ports::LinkStatus;
use stirtank::events::{EventKind, Payload};
use stirtank::net::BrokerState;
use stirtank::net::association::REASON_NOT_DETECTABLE;

fn config_publishes(rig: &Rig) -> usize {
    rig.broker
        .published()
        .iter()
        .filter(|(t, _)| t.ends_with("/config"))
        .count()
}

#[test]
fn joins_strongest_matching_access_point() {
    let mut rig = Rig::new();
    rig.wifi.add_ap("eduroam", 1, -70);
    rig.wifi.add_ap("eduroam", 2, -40);
    rig.wifi.add_ap("guest", 3, -20);
    rig.boot();

    assert_eq!(rig.wifi.joined(), vec![[0, 0, 0, 0, 0, 2]]);
    assert_eq!(rig.wifi.users(), vec!["lab@example.ac.uk".to_owned()]);
    assert_eq!(rig.events.count(EventKind::WifiConnecting), 1);
}

#[test]
fn missing_network_backs_off() {
    let mut rig = Rig::new();
    rig.boot();
    let wifi = rig.firmware.tasks().wifi;

    assert_eq!(
        rig.events.payloads(EventKind::WifiConnectFailed),
        vec![Payload::Reason(REASON_NOT_DETECTABLE)]
    );
    assert_eq!(rig.firmware.scheduler().period_ms(wifi), 60_000);

    rig.run_for(59_900);
    assert_eq!(rig.events.count(EventKind::WifiConnectFailed), 1);

    rig.run_for(100);
    assert_eq!(rig.events.count(EventKind::WifiConnectFailed), 2);
    assert_eq!(rig.firmware.scheduler().period_ms(wifi), 120_000);
    assert!(rig.wifi.joined().is_empty());
}

#[test]
fn access_point_appearing_later_is_joined_on_retry() {
    let mut rig = Rig::new();
    rig.boot();
    rig.wifi.add_ap("eduroam", 4, -60);
    rig.run_for(60_000);

    assert_eq!(rig.wifi.joined(), vec![[0, 0, 0, 0, 0, 4]]);
    rig.wifi.set_status(LinkStatus::Connected);
    rig.run_for(100);
    assert_eq!(rig.events.count(EventKind::WifiConnected), 1);
    assert_eq!(rig.firmware.broker().state(), BrokerState::Connected);
}

#[test]
fn wifi_drop_parks_telemetry_and_recovers() {
    let mut rig = Rig::new();
    rig.bring_network_up();
    assert_eq!(config_publishes(&rig), 4);

    rig.wifi.set_status(LinkStatus::Disconnected);
    rig.run_for(1000);

    assert_eq!(rig.events.count(EventKind::WifiDisconnected), 1);
    assert_eq!(rig.events.count(EventKind::MqttDisconnected), 1);
    let tasks = *rig.firmware.tasks();
    assert!(!rig.firmware.scheduler().is_enabled(tasks.broker));
    assert!(!rig.firmware.scheduler().is_enabled(tasks.telemetry));
    assert_eq!(rig.firmware.broker().state(), BrokerState::Disconnected);
    // Reassociation started straight away.
    assert_eq!(rig.wifi.joined().len(), 2);

    rig.wifi.set_status(LinkStatus::Connected);
    rig.run_for(100);

    assert_eq!(rig.events.count(EventKind::WifiConnected), 2);
    assert_eq!(rig.events.count(EventKind::MqttConnected), 2);
    assert!(rig.firmware.scheduler().is_enabled(tasks.broker));
    assert!(rig.firmware.scheduler().is_enabled(tasks.telemetry));
    assert_eq!(config_publishes(&rig), 8);
}

#[test]
fn broker_drop_reconnects_and_reannounces() {
    let mut rig = Rig::new();
    rig.bring_network_up();
    assert_eq!(rig.broker.connect_attempts(), 1);

    rig.broker.drop_session();
    rig.run_for(1000);

    assert_eq!(rig.broker.connect_attempts(), 2);
    assert_eq!(rig.broker.client_ids(), vec![DEVICE_ID.to_owned(); 2]);
    let kinds: Vec<EventKind> = rig
        .events
        .kinds()
        .into_iter()
        .filter(|k| matches!(k, EventKind::MqttConnected | EventKind::MqttDisconnected))
        .collect();
    assert_eq!(
        kinds,
        vec![EventKind::MqttConnected, EventKind::MqttDisconnected, EventKind::MqttConnected]
    );
    assert_eq!(config_publishes(&rig), 8);
    // The wifi link was never touched.
    assert_eq!(rig.events.count(EventKind::WifiDisconnected), 0);
}

#[test]
fn refused_broker_keeps_telemetry_parked() {
    let mut rig = Rig::new();
    rig.broker.set_accepting(false);
    rig.bring_network_up();

    assert!(rig.events.count(EventKind::MqttConnectFailed) >= 1);
    assert_eq!(rig.events.count(EventKind::MqttConnected), 0);
    let telemetry = rig.firmware.tasks().telemetry;
    assert!(!rig.firmware.scheduler().is_enabled(telemetry));
    assert!(rig.broker.published().is_empty());

    rig.broker.set_accepting(true);
    rig.run_for(1000);
    assert_eq!(rig.events.count(EventKind::MqttConnected), 1);
    assert_eq!(config_publishes(&rig), 4);
}

#[test]
fn slow_broker_does_not_hold_up_the_control_loop() {
    let mut rig = Rig::new();
    rig.broker.set_deferred(true);
    rig.bring_network_up();
    assert_eq!(rig.firmware.broker().state(), BrokerState::Connecting);

    let stirrer = rig.firmware.tasks().stirrer;
    let before = rig.firmware.scheduler().steps(stirrer);
    rig.run_for(2000);
    // Every 100 ms tick still reaches the stirrer.
    assert_eq!(rig.firmware.scheduler().steps(stirrer), before + 20);
    assert_eq!(rig.firmware.broker().state(), BrokerState::Connecting);
    assert_eq!(rig.broker.connect_attempts(), 1);

    rig.broker.answer();
    rig.run_for(1000);
    assert_eq!(rig.events.count(EventKind::MqttConnected), 1);
    assert_eq!(config_publishes(&rig), 4);
}
